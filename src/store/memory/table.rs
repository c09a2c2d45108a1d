use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::domain::{NewOrder, Order, Product, ProductCreate, User, UserCreate};

/// A row type the in-memory store can hold.
pub trait Record: Clone + Send + Sync + 'static {
    type Create: Send + Debug;

    fn id(&self) -> i64;

    /// Build the stored row from its assigned id and creation payload.
    fn from_create(id: i64, payload: Self::Create, now: DateTime<Utc>) -> Self;
}

/// Rows keyed by id with a monotonically increasing id sequence.
///
/// Like a database sequence, an allocated id is never reused even when the
/// row that took it is rolled back.
#[derive(Debug)]
pub struct Table<T: Record> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Record> Table<T> {
    pub fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Build a row with a fresh id without storing it.
    pub fn build(&mut self, payload: T::Create, now: DateTime<Utc>) -> T {
        let id = self.allocate_id();
        T::from_create(id, payload, now)
    }

    pub fn insert(&mut self, payload: T::Create, now: DateTime<Utc>) -> T {
        let row = self.build(payload, now);
        self.put(row.clone());
        row
    }

    pub fn put(&mut self, row: T) {
        self.rows.insert(row.id(), row);
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn rows(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

impl Record for User {
    type Create = UserCreate;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_create(id: i64, payload: UserCreate, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: payload.email,
            role: payload.role,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Product {
    type Create = ProductCreate;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_create(id: i64, payload: ProductCreate, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: payload.name,
            price: payload.price,
            quantity: payload.quantity,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Record for Order {
    type Create = NewOrder;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_create(id: i64, payload: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: payload.user_id,
            product_id: payload.product_id,
            quantity: payload.quantity,
            total: payload.total,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_rows_consume_ids_without_being_stored() {
        let mut table = Table::<Product>::default();
        let now = Utc::now();

        let staged = table.build(ProductCreate::new("Staged", 1.0, 1), now);
        assert_eq!(staged.id, 1);
        assert!(!table.contains(1));

        let stored = table.insert(ProductCreate::new("Stored", 2.0, 2), now);
        assert_eq!(stored.id, 2);
        assert_eq!(table.get(2), Some(&stored));
        assert_eq!(table.rows().count(), 1);
    }
}
