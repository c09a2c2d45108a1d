//! Business services built on an injected [`Store`](crate::store::Store).

pub mod order_service;
pub mod catalog_service;
pub mod account_service;

pub use order_service::OrderService;
pub use catalog_service::CatalogService;
pub use account_service::AccountService;
