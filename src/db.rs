use crate::config::Config;
use crate::model::*;
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_schema.sql", include_str!("migrations/001_schema.sql")),
    ("002_seed_product_categories.sql", include_str!("migrations/002_seed_product_categories.sql")),
];

/// Product row with its category joined in. Filter and order on the `p.`
/// columns.
pub(crate) const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.description, p.price, p.image, \
     p.sort_order, p.availability, p.is_highlight, p.restaurant_id, p.product_category_id, \
     p.created_at, p.updated_at, pc.id, pc.name \
     FROM products p LEFT JOIN product_categories pc ON pc.id = p.product_category_id";

const RESTAURANT_COLUMNS: &str = "id, name, description, address, created_at, updated_at";

/// Timestamp format used for `created_at` / `updated_at`. Fixed width, so
/// lexical order in SQL matches chronological order.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// One shared connection. Every statement runs while holding `tx_lock`, so a
/// transaction owns the connection from BEGIN until COMMIT or ROLLBACK and
/// readers never see its uncommitted writes.
pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
    replica: bool,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.tx_lock.lock().await
    }

    pub fn is_replica(&self) -> bool {
        self.replica
    }

    pub async fn sync(&self) -> Result<()> {
        if self.replica {
            let _guard = self.lock().await;
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = "INSERT INTO _migrations (name, applied_at) VALUES (?, ?)";
        conn.execute(query, libsql::params![name, now_timestamp()]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub(crate) async fn run_migrations(conn: &Connection) -> Result<()> {
        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Self::run_migration(conn, filename, sql).await?;
        }
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());

        match cfg.app.replica() {
            Some((url, token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                let db = Builder::new_synced_database(&path, url.to_string(), token.to_string())
                    .sync_interval(sync_interval)
                    .build()
                    .await?;
                Self::setup(db, true).await
            }
            None => Self::open_local(&path).await,
        }
    }

    /// Opens a plain local database. `":memory:"` gives a private in-memory one.
    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new_local(path.as_ref()).build().await?;
        Self::setup(db, false).await
    }

    async fn setup(db: LibsqlDatabase, replica: bool) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        Self::run_migrations(&conn).await?;

        Ok(Database {
            db,
            conn,
            tx_lock: Mutex::new(()),
            replica,
        })
    }

    pub(crate) fn row_to_product(row: &libsql::Row) -> Result<Product> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            price: row.get(3)?,
            image: row.get(4)?,
            order: row.get(5)?,
            availability: row.get::<i64>(6)? != 0,
            is_highlight: row.get::<i64>(7)? != 0,
            restaurant_id: row.get(8)?,
            product_category_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            product_category: match (row.get::<Option<i64>>(12)?, row.get::<Option<String>>(13)?) {
                (Some(id), Some(name)) => Some(ProductCategory { id, name }),
                _ => None,
            },
        })
    }

    fn row_to_restaurant(row: &libsql::Row) -> Result<Restaurant> {
        Ok(Restaurant {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            address: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    /// Reads a product without taking the lock. Callers must already hold it.
    pub(crate) async fn find_product(conn: &Connection, id: i64) -> Result<Option<Product>> {
        let query = format!("{PRODUCT_SELECT} WHERE p.id = ?");
        let mut rows = conn.query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_product(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_restaurant(conn: &Connection, id: i64) -> Result<Option<Restaurant>> {
        let query = format!("SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE id = ?");
        let mut rows = conn.query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_restaurant(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_products_by_restaurant(conn: &Connection, restaurant_id: i64) -> Result<Vec<Product>> {
        let query = format!(
            "{PRODUCT_SELECT} WHERE p.restaurant_id = ? \
             ORDER BY p.sort_order IS NULL, p.sort_order, p.id"
        );
        let mut rows = conn.query(&query, libsql::params![restaurant_id]).await?;
        let mut products = vec![];

        while let Some(row) = rows.next().await? {
            products.push(Self::row_to_product(&row)?);
        }

        Ok(products)
    }

    pub async fn create_restaurant(&self, input: &CreateRestaurant) -> Result<Restaurant> {
        let query = format!(
            "INSERT INTO restaurants (name, description, address, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {RESTAURANT_COLUMNS}"
        );
        let now = now_timestamp();

        let _guard = self.lock().await;
        let mut rows = self
            .conn
            .query(
                &query,
                libsql::params![
                    input.name.trim(),
                    input.description.as_deref(),
                    input.address.as_deref(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Self::row_to_restaurant(&row)
        } else {
            anyhow::bail!("Failed to create restaurant")
        }
    }

    pub async fn get_restaurant(&self, id: i64) -> Result<Option<Restaurant>> {
        let _guard = self.lock().await;
        Self::find_restaurant(&self.conn, id).await
    }

    /// Restaurant and its menu read under one lock, so the flags are a
    /// consistent snapshot.
    pub async fn get_restaurant_detail(&self, id: i64) -> Result<Option<RestaurantDetail>> {
        let _guard = self.lock().await;

        let Some(restaurant) = Self::find_restaurant(&self.conn, id).await? else {
            return Ok(None);
        };
        let products = Self::find_products_by_restaurant(&self.conn, id).await?;

        Ok(Some(RestaurantDetail { restaurant, products }))
    }

    pub async fn list_restaurants(&self) -> Result<Vec<Restaurant>> {
        let query = format!("SELECT {RESTAURANT_COLUMNS} FROM restaurants ORDER BY id");

        let _guard = self.lock().await;
        let mut rows = self.conn.query(&query, ()).await?;
        let mut restaurants = vec![];

        while let Some(row) = rows.next().await? {
            restaurants.push(Self::row_to_restaurant(&row)?);
        }

        Ok(restaurants)
    }

    pub async fn list_product_categories(&self) -> Result<Vec<ProductCategory>> {
        let _guard = self.lock().await;
        let mut rows = self
            .conn
            .query("SELECT id, name FROM product_categories ORDER BY id", ())
            .await?;
        let mut categories = vec![];

        while let Some(row) = rows.next().await? {
            categories.push(ProductCategory {
                id: row.get(0)?,
                name: row.get(1)?,
            });
        }

        Ok(categories)
    }

    pub async fn get_product_category(&self, id: i64) -> Result<Option<ProductCategory>> {
        let _guard = self.lock().await;
        let mut rows = self
            .conn
            .query("SELECT id, name FROM product_categories WHERE id = ?", libsql::params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(ProductCategory {
                id: row.get(0)?,
                name: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn create_product(&self, input: &CreateProduct) -> Result<Product> {
        let query = r#"
            INSERT INTO products
                (name, description, price, image, sort_order, availability, is_highlight,
                 restaurant_id, product_category_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            RETURNING id
        "#;
        let now = now_timestamp();

        let _guard = self.lock().await;
        let mut rows = self
            .conn
            .query(
                query,
                libsql::params![
                    input.name.trim(),
                    input.description.as_deref(),
                    input.price,
                    input.image.as_deref(),
                    input.order,
                    input.availability as i64,
                    input.restaurant_id,
                    input.product_category_id,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await?;

        let product_id: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            anyhow::bail!("Failed to create product")
        };
        drop(rows);

        match Self::find_product(&self.conn, product_id).await? {
            Some(product) => Ok(product),
            None => anyhow::bail!("Failed to read created product {}", product_id),
        }
    }

    pub async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let _guard = self.lock().await;
        Self::find_product(&self.conn, id).await
    }

    pub async fn list_products_by_restaurant(&self, restaurant_id: i64) -> Result<Vec<Product>> {
        let _guard = self.lock().await;
        Self::find_products_by_restaurant(&self.conn, restaurant_id).await
    }

    /// Applies the set fields of `input`. `is_highlight` is never part of the
    /// statement.
    pub async fn update_product(&self, id: i64, input: &UpdateProduct) -> Result<Option<Product>> {
        let _guard = self.lock().await;

        if Self::find_product(&self.conn, id).await?.is_none() {
            return Ok(None);
        }

        let mut updates = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(name) = &input.name {
            updates.push("name = ?");
            params.push(name.trim().to_string().into());
        }
        if let Some(description) = &input.description {
            updates.push("description = ?");
            params.push(description.clone().into());
        }
        if let Some(price) = input.price {
            updates.push("price = ?");
            params.push(price.into());
        }
        if let Some(image) = &input.image {
            updates.push("image = ?");
            params.push(image.clone().into());
        }
        if let Some(order) = input.order {
            updates.push("sort_order = ?");
            params.push(order.into());
        }
        if let Some(availability) = input.availability {
            updates.push("availability = ?");
            params.push((availability as i64).into());
        }
        if let Some(category_id) = input.product_category_id {
            updates.push("product_category_id = ?");
            params.push(category_id.into());
        }

        if updates.is_empty() {
            return Self::find_product(&self.conn, id).await;
        }

        updates.push("updated_at = ?");
        params.push(now_timestamp().into());
        params.push(id.into());

        let query = format!("UPDATE products SET {} WHERE id = ?", updates.join(", "));
        self.conn.execute(&query, params).await?;

        Self::find_product(&self.conn, id).await
    }

    pub async fn delete_product(&self, id: i64) -> Result<bool> {
        let _guard = self.lock().await;
        let result = self
            .conn
            .execute("DELETE FROM products WHERE id = ?", libsql::params![id])
            .await?;
        Ok(result > 0)
    }
}
