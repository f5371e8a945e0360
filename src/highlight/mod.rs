//! Highlighted Products
//!
//! Restaurants can promote products by highlighting them. The number of
//! highlighted products is bounded globally (five by default, see
//! `app.highlight_limit`). Highlighting a product while the set is full
//! demotes the oldest highlighted product, ordered by `created_at` and then
//! by id.
//!
//! # Consistency
//!
//! - Count, demotion and promotion run in one `BEGIN IMMEDIATE` transaction
//!   while holding the database lock, so concurrent calls never both see room
//!   in the set.
//! - Any failure rolls the whole call back, including a demotion that already
//!   ran.
//! - Highlighting an already highlighted product changes nothing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use deliverus::highlight::{self, HighlightSetManager};
//!
//! let manager = HighlightSetManager::new(db.clone(), 5);
//! let outcome = manager.highlight(product_id).await?;
//!
//! let app = Router::new()
//!     .merge(highlight::routes())
//!     .with_state(app_state);
//! ```

mod handler;
mod manager;
mod routes;

pub use manager::*;

pub use routes::routes;
