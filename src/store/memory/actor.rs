use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{NewOrder, Order, Product, ProductCreate, ProductId, User, UserCreate};
use crate::error::StoreError;
use crate::store::TxId;

use super::locks::{LockTable, Waiter};
use super::messages::{StoreRequest, StoreResponse};
use super::table::Table;

/// Writes staged by an open transaction. Invisible until commit.
#[derive(Debug, Default)]
struct PendingWrites {
    orders: Vec<Order>,
    products: BTreeMap<ProductId, Product>,
}

/// Owns every table and processes one request at a time, so each commit is
/// applied atomically. Row locks queue conflicting transactions instead of
/// blocking the mailbox.
pub struct StoreActor {
    receiver: mpsc::Receiver<StoreRequest>,
    users: Table<User>,
    products: Table<Product>,
    orders: Table<Order>,
    locks: LockTable,
    transactions: HashMap<TxId, PendingWrites>,
    next_tx_id: TxId,
}

impl StoreActor {
    pub fn new(receiver: mpsc::Receiver<StoreRequest>) -> Self {
        Self {
            receiver,
            users: Table::default(),
            products: Table::default(),
            orders: Table::default(),
            locks: LockTable::default(),
            transactions: HashMap::new(),
            next_tx_id: 1,
        }
    }

    #[instrument(name = "memory_store", skip(self))]
    pub async fn run(mut self) {
        info!("MemoryStore starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::CreateUser { user, respond_to } => {
                    self.handle_create_user(user, respond_to);
                }
                StoreRequest::GetUser { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.users.get(id).cloned()));
                }
                StoreRequest::CreateProduct { product, respond_to } => {
                    self.handle_create_product(product, respond_to);
                }
                StoreRequest::GetProduct { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.visible_product(id)));
                }
                StoreRequest::ListProducts { respond_to } => {
                    let products = self
                        .products
                        .rows()
                        .filter(|product| !product.is_deleted())
                        .cloned()
                        .collect();
                    let _ = respond_to.send(Ok(products));
                }
                StoreRequest::GetOrder { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.orders.get(id).cloned()));
                }
                StoreRequest::ListOrders { product_id, respond_to } => {
                    let orders = self
                        .orders
                        .rows()
                        .filter(|order| product_id.map_or(true, |id| order.product_id == id))
                        .cloned()
                        .collect();
                    let _ = respond_to.send(Ok(orders));
                }
                StoreRequest::Begin { respond_to } => {
                    self.handle_begin(respond_to);
                }
                StoreRequest::LockProduct { tx_id, id, respond_to } => {
                    self.handle_lock_product(tx_id, id, respond_to);
                }
                StoreRequest::InsertOrder { tx_id, order, respond_to } => {
                    let _ = respond_to.send(self.handle_insert_order(tx_id, order));
                }
                StoreRequest::SaveProduct { tx_id, product, respond_to } => {
                    let _ = respond_to.send(self.handle_save_product(tx_id, product));
                }
                StoreRequest::Commit { tx_id, respond_to } => {
                    let _ = respond_to.send(self.handle_commit(tx_id));
                }
                StoreRequest::Rollback { tx_id, respond_to } => {
                    self.handle_rollback(tx_id);
                    let _ = respond_to.send(Ok(()));
                }
                StoreRequest::Shutdown => {
                    info!("MemoryStore shutting down");
                    break;
                }
            }
        }

        if !self.transactions.is_empty() {
            warn!(open = self.transactions.len(), "Discarding uncommitted transactions");
        }
        info!("MemoryStore stopped");
    }

    fn visible_product(&self, id: ProductId) -> Option<Product> {
        self.products
            .get(id)
            .filter(|product| !product.is_deleted())
            .cloned()
    }

    fn handle_begin(&mut self, respond_to: StoreResponse<TxId>) {
        let tx_id = self.next_tx_id;
        self.next_tx_id += 1;
        self.transactions.insert(tx_id, PendingWrites::default());
        if respond_to.send(Ok(tx_id)).is_err() {
            // Caller is gone; no handle exists to roll this back.
            self.transactions.remove(&tx_id);
            debug!(tx_id, "Transaction abandoned before start");
            return;
        }
        debug!(tx_id, "Transaction started");
    }

    #[instrument(fields(user_email = %user.email), skip(self, user, respond_to))]
    fn handle_create_user(&mut self, user: UserCreate, respond_to: StoreResponse<User>) {
        if self.users.rows().any(|existing| existing.email == user.email) {
            debug!("Email already registered");
            let _ = respond_to.send(Err(StoreError::Conflict(user.email)));
            return;
        }
        let user = self.users.insert(user, Utc::now());
        debug!(user_id = user.id, "User stored");
        let _ = respond_to.send(Ok(user));
    }

    #[instrument(fields(product_name = %product.name), skip(self, product, respond_to))]
    fn handle_create_product(
        &mut self,
        product: ProductCreate,
        respond_to: StoreResponse<Product>,
    ) {
        let product = self.products.insert(product, Utc::now());
        debug!(product_id = product.id, "Product stored");
        let _ = respond_to.send(Ok(product));
    }

    #[instrument(skip(self, respond_to))]
    fn handle_lock_product(
        &mut self,
        tx_id: TxId,
        id: ProductId,
        respond_to: StoreResponse<Option<Product>>,
    ) {
        if !self.transactions.contains_key(&tx_id) {
            let _ = respond_to.send(Err(StoreError::UnknownTransaction(tx_id)));
            return;
        }
        let Some(product) = self.visible_product(id) else {
            let _ = respond_to.send(Ok(None));
            return;
        };

        if self.locks.try_acquire(id, tx_id) {
            debug!("Row lock granted");
            let _ = respond_to.send(Ok(Some(product)));
        } else {
            debug!("Row lock busy, queueing");
            self.locks.enqueue(id, Waiter { tx_id, respond_to });
        }
    }

    fn handle_insert_order(&mut self, tx_id: TxId, order: NewOrder) -> Result<Order, StoreError> {
        if !self.transactions.contains_key(&tx_id) {
            return Err(StoreError::UnknownTransaction(tx_id));
        }
        if !self.users.contains(order.user_id) {
            return Err(StoreError::ForeignKey(format!("orders.user_id = {}", order.user_id)));
        }
        if !self.products.contains(order.product_id) {
            return Err(StoreError::ForeignKey(format!(
                "orders.product_id = {}",
                order.product_id
            )));
        }

        let order = self.orders.build(order, Utc::now());
        if let Some(pending) = self.transactions.get_mut(&tx_id) {
            pending.orders.push(order.clone());
        }
        debug!(tx_id, order_id = order.id, "Order staged");
        Ok(order)
    }

    fn handle_save_product(&mut self, tx_id: TxId, mut product: Product) -> Result<(), StoreError> {
        let Some(pending) = self.transactions.get_mut(&tx_id) else {
            return Err(StoreError::UnknownTransaction(tx_id));
        };
        if !self.locks.is_held_by(product.id, tx_id) {
            return Err(StoreError::NotLocked {
                tx_id,
                product_id: product.id,
            });
        }

        product.updated_at = Utc::now();
        debug!(tx_id, product_id = product.id, quantity = product.quantity, "Product staged");
        pending.products.insert(product.id, product);
        Ok(())
    }

    #[instrument(skip(self))]
    fn handle_commit(&mut self, tx_id: TxId) -> Result<(), StoreError> {
        let pending = self
            .transactions
            .remove(&tx_id)
            .ok_or(StoreError::UnknownTransaction(tx_id))?;

        let (orders, products) = (pending.orders.len(), pending.products.len());
        for product in pending.products.into_values() {
            self.products.put(product);
        }
        for order in pending.orders {
            self.orders.put(order);
        }
        self.release_locks(tx_id);

        debug!(orders, products, "Transaction committed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn handle_rollback(&mut self, tx_id: TxId) {
        self.locks.forget_waiters(tx_id);
        if self.transactions.remove(&tx_id).is_some() {
            self.release_locks(tx_id);
            debug!("Transaction rolled back");
        }
    }

    /// Frees every lock of `tx_id` and hands each one to the oldest waiter
    /// that is still listening. Waiters read the row as of the hand-off.
    fn release_locks(&mut self, tx_id: TxId) {
        for id in self.locks.held_by(tx_id) {
            self.locks.release(id, tx_id);

            while let Some(waiter) = self.locks.next_waiter(id) {
                let row = self.visible_product(id);
                let alive = self.transactions.contains_key(&waiter.tx_id)
                    && !waiter.respond_to.is_closed();

                if alive && row.is_some() {
                    if waiter.respond_to.send(Ok(row)).is_ok() {
                        debug!(product_id = id, tx_id = waiter.tx_id, "Row lock handed off");
                        break;
                    }
                } else if alive {
                    // Deleted while queued.
                    let _ = waiter.respond_to.send(Ok(None));
                }
                self.locks.release(id, waiter.tx_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    #[test]
    fn begin_nobody_waits_for_leaves_no_open_transaction() {
        let (_sender, receiver) = mpsc::channel(1);
        let mut actor = StoreActor::new(receiver);

        let (respond_to, response) = oneshot::channel();
        drop(response);
        actor.handle_begin(respond_to);
        assert!(actor.transactions.is_empty());

        let (respond_to, mut response) = oneshot::channel();
        actor.handle_begin(respond_to);
        assert_eq!(response.try_recv().unwrap(), Ok(2));
        assert_eq!(actor.transactions.len(), 1);
        assert!(actor.transactions.contains_key(&2));
    }
}
