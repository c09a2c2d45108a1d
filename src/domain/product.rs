use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProductId = i64;

/// A catalog product and its on-hand stock.
///
/// `quantity` only changes through order placement (decrement) or an
/// administrative update (absolute set), both under the product row lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Price of `quantity` units at the current price.
    pub fn total_for(&self, quantity: u32) -> f64 {
        f64::from(quantity) * self.price
    }
}

/// Payload for creating a new product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductCreate {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

impl ProductCreate {
    pub fn new(name: impl Into<String>, price: f64, quantity: u32) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }
}

/// Administrative update. Every field is set absolutely.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_multiplies_quantity_by_price() {
        let now = Utc::now();
        let product = Product {
            id: 1,
            name: "Widget".into(),
            price: 10.0,
            quantity: 5,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert_eq!(product.total_for(3), 30.0);
        assert!(!product.is_deleted());
    }
}
