//! PostgreSQL store on a sqlx pool.
//!
//! Row locks come from `SELECT ... FOR UPDATE`, bounded by a transaction
//! local `lock_timeout`. sqlx rolls a transaction back when it is dropped
//! without commit. Expected layout:
//!
//! ```text
//! users(id BIGSERIAL PK, email TEXT UNIQUE, role TEXT, created_at, updated_at)
//! products(id BIGSERIAL PK, name TEXT, price DOUBLE PRECISION, quantity INTEGER CHECK (quantity >= 0),
//!          created_at, updated_at, deleted_at NULL)
//! orders(id BIGSERIAL PK, user_id BIGINT REFERENCES users, product_id BIGINT REFERENCES products,
//!        quantity INTEGER, total DOUBLE PRECISION, created_at, updated_at)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, instrument};

use crate::domain::{
    NewOrder, Order, OrderId, Product, ProductCreate, ProductId, Role, User, UserCreate, UserId,
};
use crate::error::StoreError;
use crate::store::{Store, StoreResult, StoreTransaction, TxId};

const PRODUCT_COLUMNS: &str = "id, name, price, quantity, created_at, updated_at, deleted_at";
const ORDER_COLUMNS: &str = "id, user_id, product_id, quantity, total, created_at, updated_at";
const USER_COLUMNS: &str = "id, email, role, created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| StoreError::Database(format!("unknown role {:?}", row.role)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: f64,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, StoreError> {
        Ok(Product {
            id: row.id,
            name: row.name,
            price: row.price,
            quantity: to_unsigned(row.quantity)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    quantity: i32,
    total: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, StoreError> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: to_unsigned(row.quantity)?,
            total: row.total,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_unsigned(quantity: i32) -> StoreResult<u32> {
    u32::try_from(quantity)
        .map_err(|_| StoreError::Database(format!("negative quantity {quantity} in store")))
}

fn to_signed(quantity: u32) -> StoreResult<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::Database(format!("quantity {quantity} exceeds column range")))
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PgStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        lock_timeout: Option<Duration>,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool, lock_timeout))
    }

    pub fn from_pool(pool: PgPool, lock_timeout: Option<Duration>) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Transaction = PgTransaction;

    #[instrument(skip(self))]
    async fn begin(&self) -> StoreResult<PgTransaction> {
        let mut tx = self.pool.begin().await?;
        let tx_id: i64 = sqlx::query_scalar("SELECT txid_current()")
            .fetch_one(&mut *tx)
            .await?;
        // SET does not take bind parameters. 0 disables the timeout.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.map_or(0, |timeout| timeout.as_millis())
        ))
        .execute(&mut *tx)
        .await?;
        debug!(tx_id, "Transaction started");
        Ok(PgTransaction {
            tx,
            tx_id: tx_id as TxId,
            lock_timeout: self.lock_timeout,
        })
    }

    #[instrument(skip(self))]
    async fn create_user(&self, user: UserCreate) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (email, role, created_at, updated_at) \
             VALUES ($1, $2, now(), now()) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Conflict(_) => StoreError::Conflict(user.email.clone()),
            other => other,
        })?;
        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn create_product(&self, product: ProductCreate) -> StoreResult<Product> {
        let row: ProductRow = sqlx::query_as(&format!(
            "INSERT INTO products (name, price, quantity, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.name)
        .bind(product.price)
        .bind(to_signed(product.quantity)?)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Product::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    #[instrument(skip(self))]
    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Order::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        collect(rows)
    }

    #[instrument(skip(self))]
    async fn list_orders_for_product(&self, product_id: ProductId) -> StoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE product_id = $1 ORDER BY id"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// An open PostgreSQL transaction. Rolled back by sqlx when dropped.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    tx_id: TxId,
    lock_timeout: Option<Duration>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    fn id(&self) -> TxId {
        self.tx_id
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(User::try_from).transpose()
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::LockTimeout(_) => {
                StoreError::LockTimeout(self.lock_timeout.unwrap_or_default())
            }
            other => other,
        })?;
        row.map(Product::try_from).transpose()
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (user_id, product_id, quantity, total, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now()) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id)
        .bind(order.product_id)
        .bind(to_signed(order.quantity)?)
        .bind(order.total)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    #[instrument(fields(tx_id = self.tx_id, product_id = product.id), skip(self, product))]
    async fn save_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            "UPDATE products SET name = $2, price = $3, quantity = $4, deleted_at = $5, \
             updated_at = now() WHERE id = $1",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(to_signed(product.quantity)?)
        .bind(product.deleted_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    #[instrument(fields(tx_id = self.tx_id), skip(self))]
    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::OrderService;
    use crate::error::OrderError;
    use std::sync::Arc;

    const SCHEMA: &str = r#"
        DROP TABLE IF EXISTS orders, products, users;
        CREATE TABLE users (
            id BIGSERIAL PRIMARY KEY, email TEXT NOT NULL UNIQUE, role TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL, updated_at TIMESTAMPTZ NOT NULL);
        CREATE TABLE products (
            id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, price DOUBLE PRECISION NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            created_at TIMESTAMPTZ NOT NULL, updated_at TIMESTAMPTZ NOT NULL, deleted_at TIMESTAMPTZ);
        CREATE TABLE orders (
            id BIGSERIAL PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users(id),
            product_id BIGINT NOT NULL REFERENCES products(id), quantity INTEGER NOT NULL,
            total DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL, updated_at TIMESTAMPTZ NOT NULL);
    "#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL pointing at a scratch PostgreSQL database"]
    async fn concurrent_placements_never_oversell() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let store = PgStore::connect(&url, 16, Some(Duration::from_secs(5))).await.unwrap();
        sqlx::raw_sql(SCHEMA).execute(store.pool()).await.unwrap();

        let user = store
            .create_user(UserCreate::new("buyer@example.com", Role::User))
            .await
            .unwrap();
        let product = store
            .create_product(ProductCreate::new("Widget", 10.0, 10))
            .await
            .unwrap();

        let service = OrderService::new(Arc::new(store.clone()));
        let (user_id, product_id) = (user.id, product.id);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..25 {
            let service = service.clone();
            tasks.spawn(async move { service.place_order(user_id, product_id, 3).await });
        }

        let mut placed = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => placed += 1,
                Err(OrderError::InsufficientStock { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(placed, 3);
        let after = store.find_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.quantity, 1);
        assert_eq!(store.list_orders_for_product(product.id).await.unwrap().len(), 3);
    }
}
