//! The transactional store seam.
//!
//! Services receive a [`Store`] at construction and never reach for a global
//! handle. Every stock mutation happens inside a [`StoreTransaction`], which
//! rolls back when dropped without a successful [`StoreTransaction::commit`].

use async_trait::async_trait;

use crate::domain::{
    NewOrder, Order, OrderId, Product, ProductCreate, ProductId, User, UserCreate, UserId,
};
use crate::error::StoreError;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryStore, MemoryTransaction};
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, PgTransaction};

pub type TxId = u64;
pub type StoreResult<T> = Result<T, StoreError>;

/// Committed reads, uncontended inserts and transaction entry.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Transaction: StoreTransaction;

    async fn begin(&self) -> StoreResult<Self::Transaction>;

    async fn create_user(&self, user: UserCreate) -> StoreResult<User>;
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn create_product(&self, product: ProductCreate) -> StoreResult<Product>;
    /// Soft-deleted products read as absent.
    async fn find_product(&self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn list_products(&self) -> StoreResult<Vec<Product>>;

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>>;
    async fn list_orders(&self) -> StoreResult<Vec<Order>>;
    async fn list_orders_for_product(&self, product_id: ProductId) -> StoreResult<Vec<Order>>;

    /// Stops the backend. Later calls fail with [`StoreError::Unavailable`].
    async fn close(&self);
}

/// One unit of work against the store.
///
/// Nothing written through a transaction is visible to others before
/// `commit` returns `Ok`. Dropping the value without committing rolls it
/// back, which covers early returns, task cancellation and panics.
#[async_trait]
pub trait StoreTransaction: Send {
    fn id(&self) -> TxId;

    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    /// Reads the current product row and holds its lock until the
    /// transaction ends. Soft-deleted products read as absent.
    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order>;

    /// Writes the full product row. The row must be locked by this transaction.
    async fn save_product(&mut self, product: &Product) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
    async fn rollback(self) -> StoreResult<()>;
}
