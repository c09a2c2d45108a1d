use tokio::sync::oneshot;

use crate::domain::{
    NewOrder, Order, OrderId, Product, ProductCreate, ProductId, User, UserCreate, UserId,
};
use crate::error::StoreError;
use crate::store::TxId;

pub type StoreResponse<T> = oneshot::Sender<Result<T, StoreError>>;

/// Mailbox protocol of the in-memory store actor. Each variant carries its
/// parameters and a oneshot channel for the reply.
#[derive(Debug)]
pub enum StoreRequest {
    CreateUser {
        user: UserCreate,
        respond_to: StoreResponse<User>,
    },
    GetUser {
        id: UserId,
        respond_to: StoreResponse<Option<User>>,
    },
    CreateProduct {
        product: ProductCreate,
        respond_to: StoreResponse<Product>,
    },
    GetProduct {
        id: ProductId,
        respond_to: StoreResponse<Option<Product>>,
    },
    ListProducts {
        respond_to: StoreResponse<Vec<Product>>,
    },
    GetOrder {
        id: OrderId,
        respond_to: StoreResponse<Option<Order>>,
    },
    ListOrders {
        product_id: Option<ProductId>,
        respond_to: StoreResponse<Vec<Order>>,
    },
    Begin {
        respond_to: StoreResponse<TxId>,
    },
    /// Answered once the row lock is granted, which may be after other
    /// transactions release it.
    LockProduct {
        tx_id: TxId,
        id: ProductId,
        respond_to: StoreResponse<Option<Product>>,
    },
    InsertOrder {
        tx_id: TxId,
        order: NewOrder,
        respond_to: StoreResponse<Order>,
    },
    SaveProduct {
        tx_id: TxId,
        product: Product,
        respond_to: StoreResponse<()>,
    },
    Commit {
        tx_id: TxId,
        respond_to: StoreResponse<()>,
    },
    Rollback {
        tx_id: TxId,
        respond_to: StoreResponse<()>,
    },
    Shutdown,
}
