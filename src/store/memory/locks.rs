use std::collections::{HashMap, VecDeque};

use crate::domain::{Product, ProductId};
use crate::store::TxId;

use super::messages::StoreResponse;

/// A transaction queued behind the current holder of a row lock.
#[derive(Debug)]
pub struct Waiter {
    pub tx_id: TxId,
    pub respond_to: StoreResponse<Option<Product>>,
}

#[derive(Debug, Default)]
struct RowLock {
    holder: Option<TxId>,
    waiters: VecDeque<Waiter>,
}

/// Exclusive per-product locks with FIFO hand-off.
#[derive(Debug, Default)]
pub struct LockTable {
    rows: HashMap<ProductId, RowLock>,
}

impl LockTable {
    /// Takes the lock if it is free. Re-acquiring a held lock succeeds.
    pub fn try_acquire(&mut self, id: ProductId, tx_id: TxId) -> bool {
        let lock = self.rows.entry(id).or_default();
        match lock.holder {
            None => {
                lock.holder = Some(tx_id);
                true
            }
            Some(holder) => holder == tx_id,
        }
    }

    pub fn enqueue(&mut self, id: ProductId, waiter: Waiter) {
        self.rows.entry(id).or_default().waiters.push_back(waiter);
    }

    pub fn is_held_by(&self, id: ProductId, tx_id: TxId) -> bool {
        self.rows
            .get(&id)
            .is_some_and(|lock| lock.holder == Some(tx_id))
    }

    pub fn held_by(&self, tx_id: TxId) -> Vec<ProductId> {
        self.rows
            .iter()
            .filter(|(_, lock)| lock.holder == Some(tx_id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Frees the lock. The caller hands it on with [`LockTable::next_waiter`].
    pub fn release(&mut self, id: ProductId, tx_id: TxId) {
        if let Some(lock) = self.rows.get_mut(&id) {
            if lock.holder == Some(tx_id) {
                lock.holder = None;
            }
        }
        self.prune(id);
    }

    /// Pops the oldest waiter of a free lock and makes it the holder.
    pub fn next_waiter(&mut self, id: ProductId) -> Option<Waiter> {
        let lock = self.rows.get_mut(&id)?;
        if lock.holder.is_some() {
            return None;
        }
        let waiter = lock.waiters.pop_front();
        match &waiter {
            Some(waiter) => lock.holder = Some(waiter.tx_id),
            None => self.prune(id),
        }
        waiter
    }

    /// Drops every queued request of a transaction that is going away.
    pub fn forget_waiters(&mut self, tx_id: TxId) {
        for lock in self.rows.values_mut() {
            lock.waiters.retain(|waiter| waiter.tx_id != tx_id);
        }
        self.rows
            .retain(|_, lock| lock.holder.is_some() || !lock.waiters.is_empty());
    }

    #[cfg(test)]
    pub fn waiting(&self, id: ProductId) -> usize {
        self.rows.get(&id).map_or(0, |lock| lock.waiters.len())
    }

    fn prune(&mut self, id: ProductId) {
        if let Some(lock) = self.rows.get(&id) {
            if lock.holder.is_none() && lock.waiters.is_empty() {
                self.rows.remove(&id);
            }
        }
    }
}
