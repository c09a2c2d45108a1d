//! In-memory transactional store run as an actor.
//!
//! [`MemoryStore`] is a cheap, cloneable handle on the [`StoreActor`]
//! mailbox. The actor is the single synchronization point: it owns the
//! tables, the row locks and the staged writes of open transactions.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::domain::{
    NewOrder, Order, OrderId, Product, ProductCreate, ProductId, User, UserCreate, UserId,
};
use crate::error::StoreError;
use crate::store::{Store, StoreResult, StoreTransaction, TxId};

mod actor;
mod locks;
pub mod messages;
mod table;

pub use actor::StoreActor;
pub use messages::{StoreRequest, StoreResponse};

/// Send a request to the store actor and wait for its reply.
macro_rules! call {
    ($sender:expr, $request:ident::$variant:ident { $($field:ident),* $(,)? }) => {{
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        $sender
            .send($request::$variant { $($field,)* respond_to })
            .await
            .map_err(|_| StoreError::Unavailable("store actor closed".to_string()))?;
        response
            .await
            .map_err(|_| StoreError::Unavailable("store actor dropped the request".to_string()))?
    }};
}

/// Handle on a running [`StoreActor`].
#[derive(Clone)]
pub struct MemoryStore {
    sender: mpsc::Sender<StoreRequest>,
    lock_timeout: Option<Duration>,
}

impl MemoryStore {
    /// Creates the actor and its handle. The caller spawns [`StoreActor::run`].
    pub fn new(mailbox_size: usize, lock_timeout: Option<Duration>) -> (StoreActor, Self) {
        let (sender, receiver) = mpsc::channel(mailbox_size);
        (StoreActor::new(receiver), Self::with_sender(sender, lock_timeout))
    }

    /// Creates the actor and spawns it on the current runtime.
    pub fn spawn(
        mailbox_size: usize,
        lock_timeout: Option<Duration>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (actor, store) = Self::new(mailbox_size, lock_timeout);
        (store, tokio::spawn(actor.run()))
    }

    /// `lock_timeout` bounds each row lock wait. `None` waits until granted.
    pub fn with_sender(sender: mpsc::Sender<StoreRequest>, lock_timeout: Option<Duration>) -> Self {
        Self {
            sender,
            lock_timeout,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Transaction = MemoryTransaction;

    #[instrument(skip(self))]
    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let tx_id = call!(self.sender, StoreRequest::Begin {})?;
        Ok(MemoryTransaction {
            tx_id,
            sender: self.sender.clone(),
            lock_timeout: self.lock_timeout,
            finished: false,
        })
    }

    #[instrument(skip(self))]
    async fn create_user(&self, user: UserCreate) -> StoreResult<User> {
        call!(self.sender, StoreRequest::CreateUser { user })
    }

    #[instrument(skip(self))]
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        call!(self.sender, StoreRequest::GetUser { id })
    }

    #[instrument(skip(self))]
    async fn create_product(&self, product: ProductCreate) -> StoreResult<Product> {
        call!(self.sender, StoreRequest::CreateProduct { product })
    }

    #[instrument(skip(self))]
    async fn find_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        call!(self.sender, StoreRequest::GetProduct { id })
    }

    #[instrument(skip(self))]
    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        call!(self.sender, StoreRequest::ListProducts {})
    }

    #[instrument(skip(self))]
    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        call!(self.sender, StoreRequest::GetOrder { id })
    }

    #[instrument(skip(self))]
    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        let product_id = None;
        call!(self.sender, StoreRequest::ListOrders { product_id })
    }

    #[instrument(skip(self))]
    async fn list_orders_for_product(&self, product_id: ProductId) -> StoreResult<Vec<Order>> {
        let product_id = Some(product_id);
        call!(self.sender, StoreRequest::ListOrders { product_id })
    }

    #[instrument(skip(self))]
    async fn close(&self) {
        if self.sender.send(StoreRequest::Shutdown).await.is_err() {
            debug!("Store actor already stopped");
        }
    }
}

/// An open transaction on the [`MemoryStore`].
///
/// Dropped without commit or rollback, it schedules a rollback on the
/// current runtime so its row locks are released.
pub struct MemoryTransaction {
    tx_id: TxId,
    sender: mpsc::Sender<StoreRequest>,
    lock_timeout: Option<Duration>,
    finished: bool,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn id(&self) -> TxId {
        self.tx_id
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        call!(self.sender, StoreRequest::GetUser { id })
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let tx_id = self.tx_id;
        let sender = &self.sender;
        let lock = async move { call!(sender, StoreRequest::LockProduct { tx_id, id }) };
        let Some(lock_timeout) = self.lock_timeout else {
            return lock.await;
        };
        match tokio::time::timeout(lock_timeout, lock).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?lock_timeout, "Row lock wait timed out");
                Err(StoreError::LockTimeout(lock_timeout))
            }
        }
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let tx_id = self.tx_id;
        call!(self.sender, StoreRequest::InsertOrder { tx_id, order })
    }

    #[instrument(fields(tx_id = self.tx_id, product_id = product.id), skip(self, product))]
    async fn save_product(&mut self, product: &Product) -> StoreResult<()> {
        let tx_id = self.tx_id;
        let product = product.clone();
        call!(self.sender, StoreRequest::SaveProduct { tx_id, product })
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn commit(self) -> StoreResult<()> {
        let mut this = self;
        let tx_id = this.tx_id;
        let result: StoreResult<()> =
            async { call!(this.sender, StoreRequest::Commit { tx_id }) }.await;
        // A commit the actor rejected leaves nothing to roll back. A commit
        // lost in transit is rolled back by drop.
        if !matches!(result, Err(StoreError::Unavailable(_))) {
            this.finished = true;
        }
        result
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn rollback(self) -> StoreResult<()> {
        let mut this = self;
        let tx_id = this.tx_id;
        this.finished = true;
        call!(this.sender, StoreRequest::Rollback { tx_id })
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let tx_id = self.tx_id;
        let sender = self.sender.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(tx_id, "Rolling back dropped transaction");
                handle.spawn(async move {
                    let (respond_to, _response) = oneshot::channel();
                    let _ = sender.send(StoreRequest::Rollback { tx_id, respond_to }).await;
                });
            }
            Err(_) => warn!(tx_id, "No runtime to roll back dropped transaction"),
        }
    }
}
