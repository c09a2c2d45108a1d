//! # Mock Framework
//!
//! Utilities for testing services against a store whose replies the test
//! scripts by hand.
//!
//! Use [`create_mock_store`] to get a [`MemoryStore`] handle and the
//! receiving end of its mailbox. Then use helpers like [`expect_begin`] or
//! [`expect_lock_product`] to assert each request and answer it.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::domain::{NewOrder, Order, Product, ProductId, Role, User, UserId};
use crate::store::memory::{StoreRequest, StoreResponse};
use crate::store::{MemoryStore, TxId};

/// Creates a store handle whose requests arrive on the returned receiver
/// instead of at a running actor.
pub fn create_mock_store(buffer_size: usize) -> (MemoryStore, mpsc::Receiver<StoreRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (MemoryStore::with_sender(sender, Some(Duration::from_secs(1))), receiver)
}

pub fn sample_user(id: UserId) -> User {
    let now = Utc::now();
    User {
        id,
        email: format!("user{id}@example.com"),
        role: Role::User,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_product(id: ProductId, price: f64, quantity: u32) -> Product {
    let now = Utc::now();
    Product {
        id,
        name: format!("Product {id}"),
        price,
        quantity,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

pub fn order_from(id: i64, new: &NewOrder) -> Order {
    let now = Utc::now();
    Order {
        id,
        user_id: new.user_id,
        product_id: new.product_id,
        quantity: new.quantity,
        total: new.total,
        created_at: now,
        updated_at: now,
    }
}

pub async fn expect_begin(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<StoreResponse<TxId>> {
    match receiver.recv().await {
        Some(StoreRequest::Begin { respond_to }) => Some(respond_to),
        _ => None,
    }
}

pub async fn expect_get_user(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(UserId, StoreResponse<Option<User>>)> {
    match receiver.recv().await {
        Some(StoreRequest::GetUser { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

pub async fn expect_lock_product(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(TxId, ProductId, StoreResponse<Option<Product>>)> {
    match receiver.recv().await {
        Some(StoreRequest::LockProduct {
            tx_id,
            id,
            respond_to,
        }) => Some((tx_id, id, respond_to)),
        _ => None,
    }
}

pub async fn expect_insert_order(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(TxId, NewOrder, StoreResponse<Order>)> {
    match receiver.recv().await {
        Some(StoreRequest::InsertOrder {
            tx_id,
            order,
            respond_to,
        }) => Some((tx_id, order, respond_to)),
        _ => None,
    }
}

pub async fn expect_save_product(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(TxId, Product, StoreResponse<()>)> {
    match receiver.recv().await {
        Some(StoreRequest::SaveProduct {
            tx_id,
            product,
            respond_to,
        }) => Some((tx_id, product, respond_to)),
        _ => None,
    }
}

pub async fn expect_commit(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(TxId, StoreResponse<()>)> {
    match receiver.recv().await {
        Some(StoreRequest::Commit { tx_id, respond_to }) => Some((tx_id, respond_to)),
        _ => None,
    }
}

pub async fn expect_rollback(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(TxId, StoreResponse<()>)> {
    match receiver.recv().await {
        Some(StoreRequest::Rollback { tx_id, respond_to }) => Some((tx_id, respond_to)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{OrderError, StoreError};
    use crate::services::OrderService;

    /// Answers begin, user check and row lock for a placement on `product`.
    async fn script_until_locked(receiver: &mut mpsc::Receiver<StoreRequest>, product: Product) {
        let responder = expect_begin(receiver).await.expect("Expected Begin");
        responder.send(Ok(7)).unwrap();

        let (user_id, responder) = expect_get_user(receiver).await.expect("Expected GetUser");
        responder.send(Ok(Some(sample_user(user_id)))).unwrap();

        let (tx_id, product_id, responder) =
            expect_lock_product(receiver).await.expect("Expected LockProduct");
        assert_eq!(tx_id, 7);
        assert_eq!(product_id, product.id);
        responder.send(Ok(Some(product))).unwrap();
    }

    #[tokio::test]
    async fn placement_sends_lock_insert_save_commit_in_order() {
        let (store, mut receiver) = create_mock_store(10);
        let service = OrderService::new(Arc::new(store));

        let task = tokio::spawn(async move { service.place_order(1, 5, 3).await });

        script_until_locked(&mut receiver, sample_product(5, 10.0, 5)).await;

        let (tx_id, new_order, responder) =
            expect_insert_order(&mut receiver).await.expect("Expected InsertOrder");
        assert_eq!(tx_id, 7);
        assert_eq!(
            new_order,
            NewOrder {
                user_id: 1,
                product_id: 5,
                quantity: 3,
                total: 30.0
            }
        );
        responder.send(Ok(order_from(100, &new_order))).unwrap();

        let (_, saved, responder) =
            expect_save_product(&mut receiver).await.expect("Expected SaveProduct");
        assert_eq!(saved.quantity, 2);
        responder.send(Ok(())).unwrap();

        let (tx_id, responder) = expect_commit(&mut receiver).await.expect("Expected Commit");
        assert_eq!(tx_id, 7);
        responder.send(Ok(())).unwrap();

        let order = task.await.unwrap().unwrap();
        assert_eq!(order.id, 100);
        assert_eq!(order.total, 30.0);
    }

    #[tokio::test]
    async fn failed_save_rolls_back_and_reports_transaction_failure() {
        let (store, mut receiver) = create_mock_store(10);
        let service = OrderService::new(Arc::new(store));

        let task = tokio::spawn(async move { service.place_order(1, 5, 2).await });

        script_until_locked(&mut receiver, sample_product(5, 4.0, 5)).await;

        let (_, new_order, responder) =
            expect_insert_order(&mut receiver).await.expect("Expected InsertOrder");
        responder.send(Ok(order_from(100, &new_order))).unwrap();

        let (_, _, responder) =
            expect_save_product(&mut receiver).await.expect("Expected SaveProduct");
        responder
            .send(Err(StoreError::Unavailable("connection reset".into())))
            .unwrap();

        let (tx_id, responder) = expect_rollback(&mut receiver).await.expect("Expected Rollback");
        assert_eq!(tx_id, 7);
        responder.send(Ok(())).unwrap();

        let result = task.await.unwrap();
        assert_eq!(
            result,
            Err(OrderError::TransactionFailure(StoreError::Unavailable(
                "connection reset".into()
            )))
        );
    }

    #[tokio::test]
    async fn short_stock_rolls_back_without_writing() {
        let (store, mut receiver) = create_mock_store(10);
        let service = OrderService::new(Arc::new(store));

        let task = tokio::spawn(async move { service.place_order(1, 5, 6).await });

        script_until_locked(&mut receiver, sample_product(5, 4.0, 5)).await;

        // No InsertOrder or SaveProduct: the next request is the rollback.
        let (tx_id, responder) = expect_rollback(&mut receiver).await.expect("Expected Rollback");
        assert_eq!(tx_id, 7);
        responder.send(Ok(())).unwrap();

        assert_eq!(
            task.await.unwrap(),
            Err(OrderError::InsufficientStock {
                product_id: 5,
                requested: 6,
                available: 5
            })
        );
    }

    #[tokio::test]
    async fn rejected_commit_is_a_transaction_failure() {
        let (store, mut receiver) = create_mock_store(10);
        let service = OrderService::new(Arc::new(store));

        let task = tokio::spawn(async move { service.place_order(1, 5, 1).await });

        script_until_locked(&mut receiver, sample_product(5, 4.0, 5)).await;

        let (_, new_order, responder) =
            expect_insert_order(&mut receiver).await.expect("Expected InsertOrder");
        responder.send(Ok(order_from(100, &new_order))).unwrap();
        let (_, _, responder) =
            expect_save_product(&mut receiver).await.expect("Expected SaveProduct");
        responder.send(Ok(())).unwrap();

        let (_, responder) = expect_commit(&mut receiver).await.expect("Expected Commit");
        responder
            .send(Err(StoreError::Database("could not serialize access".into())))
            .unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(matches!(err, OrderError::TransactionFailure(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn zero_quantity_never_reaches_the_store() {
        let (store, mut receiver) = create_mock_store(10);
        let service = OrderService::new(Arc::new(store));

        assert_eq!(service.place_order(1, 5, 0).await, Err(OrderError::InvalidQuantity(0)));
        drop(service);
        assert!(receiver.recv().await.is_none());
    }
}
