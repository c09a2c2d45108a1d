use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::StoreConfig;
use crate::services::{AccountService, CatalogService, OrderService};
use crate::store::{MemoryStore, Store};

/// Wires a store into the services and owns the background tasks.
pub struct InventorySystem<S: Store> {
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub accounts: AccountService<S>,
    store: Arc<S>,
    handles: Vec<JoinHandle<()>>,
}

impl InventorySystem<MemoryStore> {
    /// Starts the in-memory store actor and the services on top of it.
    pub fn in_memory(config: &StoreConfig) -> Self {
        info!(
            mailbox_size = config.mailbox_size,
            lock_timeout_ms = config.lock_timeout_ms,
            "Starting in-memory inventory system"
        );
        let (store, handle) = MemoryStore::spawn(config.mailbox_size, config.lock_timeout());
        Self::with_store(store, vec![handle])
    }
}

#[cfg(feature = "postgres")]
impl InventorySystem<crate::store::PgStore> {
    pub async fn postgres(
        url: &str,
        max_connections: u32,
        config: &StoreConfig,
    ) -> Result<Self, crate::error::StoreError> {
        info!(max_connections, "Starting PostgreSQL inventory system");
        let store =
            crate::store::PgStore::connect(url, max_connections, config.lock_timeout()).await?;
        Ok(Self::with_store(store, Vec::new()))
    }
}

impl<S: Store> InventorySystem<S> {
    pub fn with_store(store: S, handles: Vec<JoinHandle<()>>) -> Self {
        let store = Arc::new(store);
        Self {
            orders: OrderService::new(Arc::clone(&store)),
            catalog: CatalogService::new(Arc::clone(&store)),
            accounts: AccountService::new(Arc::clone(&store)),
            store,
            handles,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Closes the store and waits for its tasks to finish.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");
        self.store.close().await;

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Store task failed: {:?}", e);
                return Err(format!("Store task failed: {:?}", e));
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
