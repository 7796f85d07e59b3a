//! Per-account nonce sequencing.
//!
//! The tracker caches the next nonce for every address it has seen. Each address has its
//! own async mutex; a sender holds it from nonce lookup until the transaction has been
//! dispatched, so two concurrent submissions from one account never share a nonce while
//! unrelated accounts proceed independently.

use crate::Result;
use alloy::primitives::Address;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Supplies the chain's view of an account's transaction count.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn transaction_count(&self, address: Address) -> Result<u64>;
}

type Slot = Arc<AsyncMutex<Option<u64>>>;

/// Entries are never removed, so each address keeps one lock for the tracker's lifetime.
/// The map grows with the number of distinct senders, which are long-lived in a load run.
#[derive(Clone, Debug, Default)]
pub struct NonceTracker {
    slots: Arc<Mutex<HashMap<Address, Slot>>>,
}

/// Exclusive access to one address's cached nonce.
pub struct NonceGuard {
    address: Address,
    next: OwnedMutexGuard<Option<u64>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, address: Address) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(address).or_default().clone()
    }

    /// Waits for exclusive access to `address`. Other addresses are unaffected.
    pub async fn lock(&self, address: Address) -> NonceGuard {
        let next = self.slot(address).lock_owned().await;
        NonceGuard { address, next }
    }

    /// Returns the next nonce to use, querying `source` the first time `address` is seen.
    pub async fn current(&self, address: Address, source: &dyn NonceSource) -> Result<u64> {
        self.lock(address).await.current(source).await
    }

    /// Moves the cached nonce forward by one.
    pub async fn advance(&self, address: Address) {
        self.lock(address).await.advance();
    }

    /// Raises the cached nonce to `chain_nonce` if the chain is ahead. Never lowers it.
    pub async fn reconcile(&self, address: Address, chain_nonce: u64) -> u64 {
        self.lock(address).await.reconcile(chain_nonce)
    }

    /// Forgets the cached value; the next `current` call re-queries the chain.
    pub async fn reset(&self, address: Address) {
        self.lock(address).await.reset();
    }

    /// Cached next nonce, if the address has been initialized.
    pub async fn cached(&self, address: Address) -> Option<u64> {
        *self.lock(address).await.next
    }
}

impl NonceGuard {
    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn current(&mut self, source: &dyn NonceSource) -> Result<u64> {
        if let Some(n) = *self.next {
            return Ok(n);
        }
        let n = source.transaction_count(self.address).await?;
        debug!("initialized nonce for {} at {n}", self.address);
        *self.next = Some(n);
        Ok(n)
    }

    /// No-op until the nonce has been initialized.
    pub fn advance(&mut self) {
        if let Some(n) = self.next.as_mut() {
            *n += 1;
        }
    }

    /// Drops the cached value so the next `current` re-reads the chain's pending count.
    pub fn reset(&mut self) {
        if self.next.take().is_some() {
            debug!("reset nonce for {}", self.address);
        }
    }

    pub fn reconcile(&mut self, chain_nonce: u64) -> u64 {
        let next = self.next.map_or(chain_nonce, |n| n.max(chain_nonce));
        if Some(next) != *self.next {
            debug!("reconciled nonce for {} to {next}", self.address);
        }
        *self.next = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    struct MockSource {
        count: u64,
        queries: AtomicU64,
    }

    impl MockSource {
        fn new(count: u64) -> Self {
            Self {
                count,
                queries: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl NonceSource for MockSource {
        async fn transaction_count(&self, _address: Address) -> Result<u64> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.count)
        }
    }

    fn addr(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    #[tokio::test]
    async fn first_lookup_queries_chain_once() {
        let tracker = NonceTracker::new();
        let source = MockSource::new(7);
        assert_eq!(tracker.current(addr(1), &source).await.unwrap(), 7);
        assert_eq!(tracker.current(addr(1), &source).await.unwrap(), 7);
        assert_eq!(source.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn advance_is_gapless() {
        let tracker = NonceTracker::new();
        let source = MockSource::new(3);
        let mut seen = vec![];
        for _ in 0..5 {
            seen.push(tracker.current(addr(1), &source).await.unwrap());
            tracker.advance(addr(1)).await;
        }
        assert_eq!(seen, vec![3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn reconcile_only_moves_up() {
        let tracker = NonceTracker::new();
        let source = MockSource::new(10);
        tracker.current(addr(1), &source).await.unwrap();
        assert_eq!(tracker.reconcile(addr(1), 4).await, 10);
        assert_eq!(tracker.reconcile(addr(1), 15).await, 15);
        assert_eq!(tracker.cached(addr(1)).await, Some(15));
        assert_eq!(tracker.current(addr(1), &source).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn reconcile_initializes_unknown_address() {
        let tracker = NonceTracker::new();
        assert_eq!(tracker.reconcile(addr(2), 9).await, 9);
        assert_eq!(tracker.cached(addr(2)).await, Some(9));
    }

    #[tokio::test]
    async fn reset_forces_requery() {
        let tracker = NonceTracker::new();
        let source = MockSource::new(1);
        tracker.current(addr(1), &source).await.unwrap();
        tracker.advance(addr(1)).await;
        tracker.reset(addr(1)).await;
        assert_eq!(tracker.current(addr(1), &source).await.unwrap(), 1);
        assert_eq!(source.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reset_keeps_the_address_lock() {
        let tracker = NonceTracker::new();
        let before = tracker.slot(addr(3));
        tracker.reconcile(addr(3), 4).await;
        tracker.reset(addr(3)).await;
        assert!(Arc::ptr_eq(&before, &tracker.slot(addr(3))));
        assert_eq!(tracker.cached(addr(3)).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_share_a_nonce() {
        let tracker = NonceTracker::new();
        let source = Arc::new(MockSource::new(0));
        let handles = (0..64)
            .map(|_| {
                let tracker = tracker.clone();
                let source = source.clone();
                tokio::spawn(async move {
                    let mut guard = tracker.lock(addr(1)).await;
                    let n = guard.current(source.as_ref()).await.unwrap();
                    tokio::task::yield_now().await;
                    guard.advance();
                    n
                })
            })
            .collect::<Vec<_>>();
        let mut nonces = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect::<Vec<_>>();
        nonces.sort_unstable();
        assert_eq!(nonces, (0..64).collect::<Vec<u64>>());
        assert_eq!(source.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_accounts_do_not_contend() {
        let tracker = NonceTracker::new();
        let source = MockSource::new(0);
        let _held = tracker.lock(addr(1)).await;
        let other = tokio::time::timeout(
            Duration::from_millis(100),
            tracker.current(addr(2), &source),
        )
        .await;
        assert_eq!(other.unwrap().unwrap(), 0);
    }
}
