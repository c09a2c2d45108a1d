use anyhow::Context;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};

use stock_ledger::app_system::{setup_tracing, InventorySystem};
use stock_ledger::config::AppConfig;
use stock_ledger::domain::{ProductCreate, Role, UserCreate};
use stock_ledger::error::OrderError;
use stock_ledger::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;

    // Setup tracing once for the entire application
    setup_tracing(&config.logging);

    info!("Starting inventory system");
    start(&config).await
}

#[cfg(feature = "postgres")]
async fn start(config: &AppConfig) -> anyhow::Result<()> {
    match config.database_url.as_deref() {
        Some(url) => {
            let system =
                InventorySystem::postgres(url, config.max_connections, &config.store).await?;
            run(system).await
        }
        None => run(InventorySystem::in_memory(&config.store)).await,
    }
}

#[cfg(not(feature = "postgres"))]
async fn start(config: &AppConfig) -> anyhow::Result<()> {
    if config.database_url.is_some() {
        warn!("database_url is set but the postgres feature is disabled, using the in-memory store");
    }
    run(InventorySystem::in_memory(&config.store)).await
}

async fn run<S: Store>(system: InventorySystem<S>) -> anyhow::Result<()> {
    let admin = system
        .accounts
        .create_user(UserCreate::new("admin@example.com", Role::Admin))
        .await?;
    let customer = system
        .accounts
        .create_user(UserCreate::new("alice@example.com", Role::User))
        .await?;
    info!(admin_id = admin.id, customer_id = customer.id, "Accounts created");

    let product = system
        .catalog
        .create_product(ProductCreate::new("Widget", 10.0, 5))
        .await?;
    info!(product_id = product.id, stock = product.quantity, "Product created");

    let span = tracing::info_span!("order_processing");
    async {
        for attempt in 1..=2 {
            match system.orders.place_order(customer.id, product.id, 3).await {
                Ok(order) => {
                    info!(attempt, order_id = order.id, total = order.total, "Order placed")
                }
                Err(e) => warn!(attempt, status = e.status_code(), error = %e, "Order refused"),
            }
        }
    }
    .instrument(span)
    .await;

    let burst = system
        .catalog
        .create_product(ProductCreate::new("Limited edition", 25.0, 10))
        .await?;

    let span = tracing::info_span!("concurrent_burst", product_id = burst.id);
    let (placed, refused) = async {
        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let orders = system.orders.clone();
            let (customer_id, product_id) = (customer.id, burst.id);
            tasks.spawn(async move { orders.place_order(customer_id, product_id, 2).await });
        }

        let (mut placed, mut refused) = (0, 0);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => placed += 1,
                Ok(Err(OrderError::InsufficientStock { .. })) => refused += 1,
                Ok(Err(e)) => error!(error = %e, "Placement failed"),
                Err(e) => error!(error = %e, "Placement task panicked"),
            }
        }
        (placed, refused)
    }
    .instrument(span)
    .await;

    let remaining = system.catalog.get_product(burst.id).await?.quantity;
    info!(placed, refused, remaining, "Concurrent burst finished");

    system.shutdown().await.map_err(anyhow::Error::msg)?;

    info!("Application completed successfully");
    Ok(())
}
