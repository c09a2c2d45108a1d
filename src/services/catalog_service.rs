use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Product, ProductCreate, ProductId, ProductUpdate};
use crate::error::CatalogError;
use crate::store::{Store, StoreTransaction};

/// Administrative product management and catalog reads.
///
/// Writes to an existing product take the same row lock as order placement,
/// so an absolute stock set is never lost under a concurrent decrement.
pub struct CatalogService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn validate(name: &str, price: f64) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::ValidationError("Name required".to_string()));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::ValidationError(format!(
            "Price must be a non-negative amount, got {price}"
        )));
    }
    Ok(())
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(fields(product_name = %product.name), skip(self, product))]
    pub async fn create_product(&self, product: ProductCreate) -> Result<Product, CatalogError> {
        debug!("Processing create_product request");
        if let Err(e) = validate(&product.name, product.price) {
            warn!(error = %e, "Validation failed");
            return Err(e);
        }

        let product = self.store.create_product(product).await?;
        info!(product_id = product.id, "Product created successfully");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.store
            .find_product(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        let products = self.store.list_products().await?;
        debug!(product_count = products.len(), "Listed products");
        Ok(products)
    }

    /// Sets name, price and stock absolutely. Existing orders keep their totals.
    #[instrument(skip(self, update), fields(quantity = update.quantity))]
    pub async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, CatalogError> {
        debug!("Processing update_product request");
        validate(&update.name, update.price)?;

        self.with_locked(id, move |product| {
            product.name = update.name;
            product.price = update.price;
            product.quantity = update.quantity;
        })
        .await
        .inspect(|_| info!("Product updated successfully"))
    }

    /// Hides the product from reads and placements. Its orders remain.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError> {
        self.with_locked(id, |product| product.deleted_at = Some(Utc::now()))
            .await?;
        info!("Product deleted");
        Ok(())
    }

    async fn with_locked(
        &self,
        id: ProductId,
        change: impl FnOnce(&mut Product) + Send,
    ) -> Result<Product, CatalogError> {
        let mut tx = self.store.begin().await?;
        let Some(mut product) = tx.lock_product(id).await? else {
            tx.rollback().await?;
            return Err(CatalogError::NotFound(id));
        };

        change(&mut product);
        tx.save_product(&product).await?;
        tx.commit().await?;
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_names_and_bad_prices() {
        assert!(validate("Widget", 0.0).is_ok());
        assert!(matches!(validate("  ", 1.0), Err(CatalogError::ValidationError(_))));
        assert!(matches!(validate("Widget", -0.01), Err(CatalogError::ValidationError(_))));
        assert!(matches!(validate("Widget", f64::NAN), Err(CatalogError::ValidationError(_))));
    }
}
