use std::sync::Arc;

use libsql::Connection;
use serde::Serialize;

use crate::db::{Database, PRODUCT_SELECT, now_timestamp};
use crate::error::HighlightError;
use crate::model::Product;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightOutcome {
    pub product: Product,
    /// Ids demoted to make room, oldest first. Empty unless the set was full.
    pub evicted: Vec<i64>,
}

/// Sole writer of `products.is_highlight`.
#[derive(Clone)]
pub struct HighlightSetManager {
    db: Arc<Database>,
    limit: usize,
}

impl HighlightSetManager {
    pub fn new(db: Arc<Database>, limit: usize) -> Self {
        Self {
            db,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn highlight(&self, product_id: i64) -> Result<HighlightOutcome, HighlightError> {
        let _guard = self.db.lock().await;
        let conn = self.db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.promote(conn, product_id).await;
        let outcome = Self::finish(conn, result).await?;

        tracing::info!(
            product_id = outcome.product.id,
            evicted = ?outcome.evicted,
            "product highlighted"
        );
        Ok(outcome)
    }

    pub async fn unhighlight(&self, product_id: i64) -> Result<Product, HighlightError> {
        let _guard = self.db.lock().await;
        let conn = self.db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = Self::demote(conn, product_id).await;
        let product = Self::finish(conn, result).await?;

        tracing::info!(product_id = product.id, "product unhighlighted");
        Ok(product)
    }

    /// Highlighted products, oldest first.
    pub async fn highlighted(&self) -> Result<Vec<Product>, HighlightError> {
        let query = format!(
            "{PRODUCT_SELECT} WHERE p.is_highlight = 1 ORDER BY p.created_at, p.id"
        );

        let _guard = self.db.lock().await;
        let mut rows = self.db.connection().query(&query, ()).await?;
        let mut products = vec![];

        while let Some(row) = rows.next().await? {
            products.push(Database::row_to_product(&row)?);
        }

        Ok(products)
    }

    async fn finish<T>(conn: &Connection, result: Result<T, HighlightError>) -> Result<T, HighlightError> {
        match result {
            Ok(value) => match conn.execute("COMMIT", ()).await {
                Ok(_) => Ok(value),
                Err(e) => {
                    tracing::error!(error = %e, "failed to commit highlight transaction");
                    if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                        tracing::error!(error = %rollback, "failed to roll back highlight transaction");
                    }
                    Err(e.into())
                }
            },
            Err(e) => {
                if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                    tracing::error!(error = %rollback, "failed to roll back highlight transaction");
                }
                Err(e)
            }
        }
    }

    async fn promote(&self, conn: &Connection, product_id: i64) -> Result<HighlightOutcome, HighlightError> {
        let target = Database::find_product(conn, product_id)
            .await?
            .ok_or(HighlightError::NotFound(product_id))?;

        if target.is_highlight {
            return Ok(HighlightOutcome {
                product: target,
                evicted: vec![],
            });
        }

        let count = Self::count_highlighted(conn).await?;
        let mut evicted = vec![];

        // Normally exactly one; more only when the limit was lowered.
        if count >= self.limit {
            evicted = Self::oldest_highlighted(conn, count - self.limit + 1).await?;
            for id in &evicted {
                Self::set_flag(conn, *id, false).await?;
            }
        }

        Self::set_flag(conn, product_id, true).await?;

        let product = Database::find_product(conn, product_id)
            .await?
            .ok_or(HighlightError::NotFound(product_id))?;

        Ok(HighlightOutcome { product, evicted })
    }

    async fn demote(conn: &Connection, product_id: i64) -> Result<Product, HighlightError> {
        let target = Database::find_product(conn, product_id)
            .await?
            .ok_or(HighlightError::NotFound(product_id))?;

        if !target.is_highlight {
            return Ok(target);
        }

        Self::set_flag(conn, product_id, false).await?;

        Database::find_product(conn, product_id)
            .await?
            .ok_or(HighlightError::NotFound(product_id))
    }

    async fn count_highlighted(conn: &Connection) -> Result<usize, HighlightError> {
        let mut rows = conn
            .query("SELECT COUNT(*) FROM products WHERE is_highlight = 1", ())
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as usize),
            None => Err(anyhow::anyhow!("count returned no rows").into()),
        }
    }

    async fn oldest_highlighted(conn: &Connection, n: usize) -> Result<Vec<i64>, HighlightError> {
        let mut rows = conn
            .query(
                "SELECT id FROM products WHERE is_highlight = 1 ORDER BY created_at ASC, id ASC LIMIT ?",
                libsql::params![n as i64],
            )
            .await?;
        let mut ids = vec![];

        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }

        Ok(ids)
    }

    async fn set_flag(conn: &Connection, product_id: i64, flag: bool) -> Result<(), HighlightError> {
        let changed = conn
            .execute(
                "UPDATE products SET is_highlight = ?, updated_at = ? WHERE id = ?",
                libsql::params![flag as i64, now_timestamp(), product_id],
            )
            .await?;

        if changed == 0 {
            return Err(HighlightError::NotFound(product_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_db, new_product, seed_restaurant};
    use std::collections::BTreeSet;

    async fn setup(limit: usize, n: usize) -> (HighlightSetManager, Arc<Database>, Vec<Product>) {
        let db = Arc::new(memory_db().await);
        let restaurant = seed_restaurant(&db).await;
        let mut products = vec![];

        for i in 0..n {
            let name = format!("Product {}", (b'A' + i as u8) as char);
            let product = db.create_product(&new_product(restaurant.id, &name)).await.unwrap();
            set_created_at(&db, product.id, &format!("2024-01-{:02}T12:00:00.000000Z", i + 1)).await;
            products.push(product);
        }

        (HighlightSetManager::new(db.clone(), limit), db, products)
    }

    async fn set_created_at(db: &Database, id: i64, created_at: &str) {
        db.connection()
            .execute(
                "UPDATE products SET created_at = ? WHERE id = ?",
                libsql::params![created_at, id],
            )
            .await
            .unwrap();
    }

    async fn highlighted_ids(manager: &HighlightSetManager) -> BTreeSet<i64> {
        manager
            .highlighted()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    fn ids(products: &[Product]) -> BTreeSet<i64> {
        products.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_highlight_below_limit_does_not_evict() {
        let (manager, _db, products) = setup(5, 4).await;
        for p in &products[..3] {
            manager.highlight(p.id).await.unwrap();
        }

        let outcome = manager.highlight(products[3].id).await.unwrap();
        assert!(outcome.evicted.is_empty());
        assert!(outcome.product.is_highlight);
        assert_eq!(highlighted_ids(&manager).await, ids(&products));
    }

    #[tokio::test]
    async fn test_highlight_at_limit_evicts_oldest() {
        let (manager, db, products) = setup(5, 6).await;
        for p in &products[..5] {
            manager.highlight(p.id).await.unwrap();
        }

        let outcome = manager.highlight(products[5].id).await.unwrap();
        assert_eq!(outcome.evicted, vec![products[0].id]);
        assert!(outcome.product.is_highlight);
        assert_eq!(highlighted_ids(&manager).await, ids(&products[1..]));

        let evicted = db.get_product(products[0].id).await.unwrap().unwrap();
        assert!(!evicted.is_highlight);
    }

    #[tokio::test]
    async fn test_oldest_is_by_created_at_not_id() {
        let (manager, db, products) = setup(5, 6).await;
        // Reverse creation times so the highest id is the oldest.
        for (i, p) in products.iter().enumerate() {
            set_created_at(&db, p.id, &format!("2024-02-{:02}T08:00:00.000000Z", 20 - i)).await;
        }
        for p in &products[..5] {
            manager.highlight(p.id).await.unwrap();
        }

        let outcome = manager.highlight(products[5].id).await.unwrap();
        assert_eq!(outcome.evicted, vec![products[4].id]);
    }

    #[tokio::test]
    async fn test_equal_created_at_breaks_ties_by_id() {
        let (manager, db, products) = setup(2, 3).await;
        for p in &products {
            set_created_at(&db, p.id, "2024-03-01T00:00:00.000000Z").await;
        }
        manager.highlight(products[1].id).await.unwrap();
        manager.highlight(products[0].id).await.unwrap();

        let outcome = manager.highlight(products[2].id).await.unwrap();
        assert_eq!(outcome.evicted, vec![products[0].id]);
    }

    #[tokio::test]
    async fn test_rehighlight_when_full_is_noop() {
        let (manager, _db, products) = setup(5, 5).await;
        for p in &products {
            manager.highlight(p.id).await.unwrap();
        }

        let outcome = manager.highlight(products[2].id).await.unwrap();
        assert!(outcome.evicted.is_empty());
        assert_eq!(highlighted_ids(&manager).await, ids(&products));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found_and_changes_nothing() {
        let (manager, _db, products) = setup(5, 5).await;
        for p in &products {
            manager.highlight(p.id).await.unwrap();
        }

        let err = manager.highlight(9_999).await.unwrap_err();
        assert!(matches!(err, HighlightError::NotFound(9_999)));
        assert_eq!(highlighted_ids(&manager).await, ids(&products));
    }

    #[tokio::test]
    async fn test_failed_promotion_rolls_back_eviction() {
        let (manager, db, products) = setup(5, 6).await;
        for p in &products[..5] {
            manager.highlight(p.id).await.unwrap();
        }

        let trigger = format!(
            "CREATE TRIGGER reject_promotion BEFORE UPDATE OF is_highlight ON products \
             WHEN NEW.is_highlight = 1 AND NEW.id = {} \
             BEGIN SELECT RAISE(ABORT, 'promotion rejected'); END;",
            products[5].id
        );
        db.connection().execute_batch(&trigger).await.unwrap();

        let err = manager.highlight(products[5].id).await.unwrap_err();
        assert!(matches!(err, HighlightError::OperationFailed(_)));
        assert_eq!(highlighted_ids(&manager).await, ids(&products[..5]));

        // The connection is usable again once the transaction is gone.
        db.connection()
            .execute_batch("DROP TRIGGER reject_promotion;")
            .await
            .unwrap();
        let outcome = manager.highlight(products[5].id).await.unwrap();
        assert_eq!(outcome.evicted, vec![products[0].id]);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_and_frees_connection() {
        let (manager, db, products) = setup(5, 6).await;
        for p in &products[..5] {
            manager.highlight(p.id).await.unwrap();
        }

        // Deferred foreign key: the violation only surfaces at COMMIT.
        db.connection()
            .execute_batch(
                "CREATE TABLE promotion_log (
                     product_id INTEGER REFERENCES products(id) DEFERRABLE INITIALLY DEFERRED
                 );
                 CREATE TRIGGER log_promotion AFTER UPDATE OF is_highlight ON products
                 WHEN NEW.is_highlight = 1
                 BEGIN INSERT INTO promotion_log (product_id) VALUES (-1); END;",
            )
            .await
            .unwrap();

        let err = manager.highlight(products[5].id).await.unwrap_err();
        assert!(matches!(err, HighlightError::OperationFailed(_)));
        assert_eq!(highlighted_ids(&manager).await, ids(&products[..5]));

        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM promotion_log", ())
            .await
            .unwrap();
        let logged: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(logged, 0);
        drop(rows);

        db.connection()
            .execute_batch("DROP TRIGGER log_promotion;")
            .await
            .unwrap();
        let outcome = manager.highlight(products[5].id).await.unwrap();
        assert_eq!(outcome.evicted, vec![products[0].id]);
    }

    #[tokio::test]
    async fn test_limit_holds_over_call_sequence() {
        let (manager, _db, products) = setup(3, 8).await;
        let sequence = [0, 4, 4, 7, 1, 2, 0, 6, 5, 3, 7, 1, 2, 2, 6];

        for i in sequence {
            manager.highlight(products[i].id).await.unwrap();
            let current = highlighted_ids(&manager).await;
            assert!(current.len() <= 3, "{} highlighted after {}", current.len(), i);
            assert!(current.contains(&products[i].id));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_highlights_respect_limit() {
        let (manager, _db, products) = setup(5, 20).await;

        let tasks = products.iter().map(|p| {
            let manager = manager.clone();
            let id = p.id;
            tokio::spawn(async move { manager.highlight(id).await })
        });
        let results = futures_util::future::join_all(tasks).await;

        let mut evicted_total = 0;
        for result in results {
            evicted_total += result.unwrap().unwrap().evicted.len();
        }
        assert_eq!(highlighted_ids(&manager).await.len(), 5);
        assert_eq!(evicted_total, 15);
    }

    #[tokio::test]
    async fn test_lowered_limit_trims_the_set() {
        let (manager, db, products) = setup(5, 6).await;
        for p in &products[..5] {
            manager.highlight(p.id).await.unwrap();
        }

        let smaller = HighlightSetManager::new(db.clone(), 2);
        let outcome = smaller.highlight(products[5].id).await.unwrap();
        assert_eq!(outcome.evicted, products[..4].iter().map(|p| p.id).collect::<Vec<_>>());
        assert_eq!(highlighted_ids(&smaller).await, ids(&products[4..]));
    }

    #[tokio::test]
    async fn test_unhighlight() {
        let (manager, _db, products) = setup(5, 2).await;
        manager.highlight(products[0].id).await.unwrap();

        let product = manager.unhighlight(products[0].id).await.unwrap();
        assert!(!product.is_highlight);
        assert!(highlighted_ids(&manager).await.is_empty());

        let untouched = manager.unhighlight(products[1].id).await.unwrap();
        assert!(!untouched.is_highlight);
        assert_eq!(untouched.updated_at, products[1].updated_at);

        let err = manager.unhighlight(9_999).await.unwrap_err();
        assert!(matches!(err, HighlightError::NotFound(9_999)));
    }

    #[tokio::test]
    async fn test_limit_is_at_least_one() {
        let db = Arc::new(memory_db().await);
        assert_eq!(HighlightSetManager::new(db, 0).limit(), 1);
    }
}
