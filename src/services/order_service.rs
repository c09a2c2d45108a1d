use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{NewOrder, Order, OrderId, ProductId, UserId};
use crate::error::OrderError;
use crate::store::{Store, StoreTransaction};

/// Places orders against a transactional store without overselling.
pub struct OrderService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> OrderService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Places an order for `quantity` units of a product on behalf of a user.
    ///
    /// Runs as one transaction: lock the product row, check stock, insert the
    /// order with `total = quantity × price` from the locked row, decrement
    /// the stock, commit. Any failure rolls everything back. The call is not
    /// idempotent: identical calls create distinct orders.
    ///
    /// # Errors
    /// - [`OrderError::InvalidQuantity`] when `quantity` is zero
    /// - [`OrderError::InvalidUser`] when the user does not exist
    /// - [`OrderError::NotFound`] when the product does not exist
    /// - [`OrderError::InsufficientStock`] when stock is below `quantity`
    /// - [`OrderError::TransactionFailure`] when the store cannot complete
    #[instrument(skip(self))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, OrderError> {
        debug!("Processing place_order request");

        if quantity == 0 {
            warn!("Rejected zero quantity");
            return Err(OrderError::InvalidQuantity(quantity));
        }

        let result = self.place_in_transaction(user_id, product_id, quantity).await;
        match &result {
            Ok(order) => info!(order_id = order.id, total = order.total, "Order placed"),
            Err(OrderError::TransactionFailure(e)) => {
                error!(product_id, quantity, error = %e, "Order transaction failed")
            }
            Err(e) => warn!(error = %e, "Order rejected"),
        }
        result
    }

    async fn place_in_transaction(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;

        match Self::apply(&mut tx, user_id, product_id, quantity).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(e) => {
                let tx_id = tx.id();
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(tx_id, error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        tx: &mut S::Transaction,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, OrderError> {
        if tx.find_user(user_id).await?.is_none() {
            return Err(OrderError::InvalidUser(user_id));
        }

        let mut product = tx
            .lock_product(product_id)
            .await?
            .ok_or(OrderError::NotFound(product_id))?;

        let Some(remaining) = product.quantity.checked_sub(quantity) else {
            return Err(OrderError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.quantity,
            });
        };

        let order = tx
            .insert_order(NewOrder {
                user_id,
                product_id,
                quantity,
                total: product.total_for(quantity),
            })
            .await?;

        product.quantity = remaining;
        tx.save_product(&product).await?;
        debug!(order_id = order.id, remaining, "Stock decremented");

        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order, OrderError> {
        self.store
            .find_order(id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        let orders = self.store.list_orders().await?;
        debug!(order_count = orders.len(), "Listed orders");
        Ok(orders)
    }

    #[instrument(skip(self))]
    pub async fn list_orders_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders_for_product(product_id).await?)
    }
}
