//! # Stock ledger
//!
//! Inventory backend core: accounts, catalog products with stock levels, and
//! orders that consume stock without ever overselling.
//!
//! ## Ingredients
//!
//! - **Domain types** - plain records with no store concerns → [`domain::User`], [`domain::Product`], [`domain::Order`]
//! - **Store seam** - [`store::Store`] and [`store::StoreTransaction`], injected into every service
//!     - **MemoryStore** - an actor that owns the tables, the row locks and staged writes → [`store::MemoryStore`]
//!     - **PgStore** - PostgreSQL with `SELECT ... FOR UPDATE` (feature `postgres`)
//! - **Services** - [`services::OrderService`] places orders; catalog and account services around it
//! - **System coordinator** - startup, wiring and shutdown → [`app_system::InventorySystem`]
//! - **Tracing setup** - [`app_system::setup_tracing`]
//!
//! ## Example Usage
//!
//! ```no_run
//! # use stock_ledger::app_system::InventorySystem;
//! # use stock_ledger::config::StoreConfig;
//! # use stock_ledger::domain::{ProductCreate, Role, UserCreate};
//! # async fn demo() -> anyhow::Result<()> {
//! let system = InventorySystem::in_memory(&StoreConfig::default());
//!
//! let user = system.accounts.create_user(UserCreate::new("alice@example.com", Role::User)).await?;
//! let product = system.catalog.create_product(ProductCreate::new("Widget", 10.0, 5)).await?;
//!
//! // Locks the product row, checks stock, records the order and decrements
//! // stock in one transaction.
//! let order = system.orders.place_order(user.id, product.id, 3).await?;
//! assert_eq!(order.total, 30.0);
//!
//! system.shutdown().await.map_err(anyhow::Error::msg)?;
//! # Ok(())
//! # }
//! ```

pub mod app_system;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod store;

#[cfg(test)]
mod mock_framework;
