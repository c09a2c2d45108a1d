use std::time::Duration;

use thiserror::Error;

use crate::domain::{OrderId, ProductId, UserId};
use crate::store::TxId;

/// Failures raised by a store backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Lock wait timed out after {0:?}")]
    LockTimeout(Duration),
    #[error("Product {product_id} is not locked by transaction {tx_id}")]
    NotLocked { tx_id: TxId, product_id: ProductId },
    #[error("Transaction {0} is not open")]
    UnknownTransaction(TxId),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Foreign key violated: {0}")]
    ForeignKey(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the same call could succeed if the caller tries again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::Unavailable(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // lock_not_available
                Some("55P03") => StoreError::LockTimeout(Duration::ZERO),
                Some("23505") => StoreError::Conflict(db.message().to_string()),
                Some("23503") => StoreError::ForeignKey(db.message().to_string()),
                _ => StoreError::Database(err.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Outcomes of order placement and order lookups.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),
    #[error("Invalid user: {0}")]
    InvalidUser(UserId),
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
    #[error("Order transaction failed: {0}")]
    TransactionFailure(#[from] StoreError),
}

impl OrderError {
    /// Transport status the request layer reports for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            OrderError::NotFound(_)
            | OrderError::InvalidUser(_)
            | OrderError::OrderNotFound(_) => 404,
            OrderError::InsufficientStock { .. } | OrderError::InvalidQuantity(_) => 400,
            OrderError::TransactionFailure(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),
    #[error("Product validation error: {0}")]
    ValidationError(String),
    #[error("Product store error: {0}")]
    Store(#[from] StoreError),
}

impl CatalogError {
    pub fn status_code(&self) -> u16 {
        match self {
            CatalogError::NotFound(_) => 404,
            CatalogError::ValidationError(_) => 400,
            CatalogError::Store(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccountError {
    #[error("User not found: {0}")]
    NotFound(UserId),
    #[error("User already exists: {0}")]
    AlreadyExists(String),
    #[error("User validation error: {0}")]
    ValidationError(String),
    #[error("User store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(email) => AccountError::AlreadyExists(email),
            other => AccountError::Store(other),
        }
    }
}

impl AccountError {
    pub fn status_code(&self) -> u16 {
        match self {
            AccountError::NotFound(_) => 404,
            AccountError::AlreadyExists(_) => 409,
            AccountError::ValidationError(_) => 400,
            AccountError::Store(_) => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_errors_map_to_distinct_statuses() {
        assert_eq!(OrderError::NotFound(1).status_code(), 404);
        let short = OrderError::InsufficientStock {
            product_id: 1,
            requested: 3,
            available: 2,
        };
        assert_eq!(short.status_code(), 400);
        assert_ne!(short, OrderError::NotFound(1));
        let failed = OrderError::from(StoreError::Unavailable("closed".into()));
        assert_eq!(failed.status_code(), 500);
    }

    #[test]
    fn only_lock_and_connection_failures_are_transient() {
        assert!(StoreError::LockTimeout(Duration::from_millis(5)).is_transient());
        assert!(StoreError::Unavailable("closed".into()).is_transient());
        assert!(!StoreError::Conflict("email".into()).is_transient());
        assert!(!StoreError::UnknownTransaction(4).is_transient());
    }

    #[test]
    fn duplicate_email_becomes_already_exists() {
        let err = AccountError::from(StoreError::Conflict("a@example.com".into()));
        assert_eq!(err, AccountError::AlreadyExists("a@example.com".into()));
        assert_eq!(err.status_code(), 409);
    }
}
