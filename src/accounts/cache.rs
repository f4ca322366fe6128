//! Account number / sequence cache.
//!
//! # Responsibilities
//! - Serve `(account_number, sequence)` for an address without a node round trip
//! - Advance the cached sequence on every hit, since each hit signs a new tx
//! - Forget entries after the TTL or on explicit invalidation
//! - Hand an unused sequence back with `restore`, so the next hit signs with it again
//!
//! # Design Decisions
//! - Process-local; callers serialize per address with `ShardedLocker`, so the
//!   read-modify-write of one entry never races with itself
//! - A hit restarts the TTL

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::SdkResult;
use crate::observability::metrics;
use crate::query::ChainQuerier;

/// Account number and the next sequence to sign with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy)]
struct CachedAccount {
    info: AccountInfo,
    expires_at: Instant,
    /// Next hit reuses `info.sequence` instead of advancing it.
    reuse: bool,
}

/// TTL cache keyed by bech32 address.
#[derive(Debug)]
pub struct AccountCache {
    entries: DashMap<String, CachedAccount>,
    ttl: Duration,
}

impl AccountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Return the account info to sign with.
    ///
    /// Hit: the cached sequence plus one, written back. Miss or expired: the
    /// node's current values, cached as-is.
    pub async fn query_and_refresh(&self, address: &str, querier: &dyn ChainQuerier) -> SdkResult<AccountInfo> {
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(address) {
            if entry.expires_at > now {
                if entry.reuse {
                    entry.reuse = false;
                } else {
                    entry.info.sequence += 1;
                }
                entry.expires_at = now + self.ttl;
                let info = entry.info;
                drop(entry);

                metrics::record_account_cache(true);
                tracing::debug!(address = %address, sequence = info.sequence, "Account cache hit");
                return Ok(info);
            }
        }

        metrics::record_account_cache(false);
        self.entries.remove(address);

        let account = querier.query_account(address).await?;
        let info = AccountInfo {
            account_number: account.account_number,
            sequence: account.sequence,
        };
        self.entries.insert(
            address.to_string(),
            CachedAccount {
                info,
                expires_at: Instant::now() + self.ttl,
                reuse: false,
            },
        );

        tracing::debug!(
            address = %address,
            account_number = info.account_number,
            sequence = info.sequence,
            "Account loaded from node"
        );
        Ok(info)
    }

    /// Cached value without touching it, if still live.
    pub fn get(&self, address: &str) -> Option<AccountInfo> {
        self.entries
            .get(address)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.info)
    }

    /// Give back `info`, returned by `query_and_refresh` but never broadcast.
    ///
    /// The next hit returns `info.sequence` again rather than the one after it.
    pub fn restore(&self, address: &str, info: AccountInfo) {
        self.entries.insert(
            address.to_string(),
            CachedAccount {
                info,
                expires_at: Instant::now() + self.ttl,
                reuse: true,
            },
        );
        tracing::debug!(address = %address, sequence = info.sequence, "Account sequence restored");
    }

    /// Drop the entry for `address`.
    pub fn remove(&self, address: &str) {
        if self.entries.remove(address).is_some() {
            tracing::debug!(address = %address, "Account cache entry invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BaseAccount, GasInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeQuerier {
        calls: AtomicU64,
        sequence: u64,
    }

    #[async_trait]
    impl ChainQuerier for FakeQuerier {
        async fn query_account(&self, address: &str) -> SdkResult<BaseAccount> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BaseAccount {
                address: address.to_string(),
                account_number: 7,
                sequence: self.sequence,
                pubkey: None,
            })
        }

        async fn simulate(&self, _tx_bytes: Vec<u8>) -> SdkResult<GasInfo> {
            Ok(GasInfo::default())
        }
    }

    fn querier(sequence: u64) -> FakeQuerier {
        FakeQuerier {
            calls: AtomicU64::new(0),
            sequence,
        }
    }

    #[tokio::test]
    async fn test_hit_advances_sequence() {
        let cache = AccountCache::new(Duration::from_secs(60));
        let q = querier(5);

        let first = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(first, AccountInfo { account_number: 7, sequence: 5 });

        let second = cache.query_and_refresh("addr", &q).await.unwrap();
        let third = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(second.sequence, 6);
        assert_eq!(third.sequence, 7);
        assert_eq!(q.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_forces_requery() {
        let cache = AccountCache::new(Duration::from_secs(60));
        let q = querier(5);

        cache.query_and_refresh("addr", &q).await.unwrap();
        cache.query_and_refresh("addr", &q).await.unwrap();
        cache.remove("addr");
        assert!(cache.get("addr").is_none());

        let info = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(info.sequence, 5);
        assert_eq!(q.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_restore_reuses_unsent_sequence() {
        let cache = AccountCache::new(Duration::from_secs(60));
        let q = querier(5);

        cache.query_and_refresh("addr", &q).await.unwrap();
        let unsent = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(unsent.sequence, 6);
        cache.restore("addr", unsent);

        let again = cache.query_and_refresh("addr", &q).await.unwrap();
        let next = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(again.sequence, 6);
        assert_eq!(next.sequence, 7);
        assert_eq!(q.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_first_sequence_after_miss() {
        let cache = AccountCache::new(Duration::from_secs(60));
        let q = querier(0);

        let first = cache.query_and_refresh("addr", &q).await.unwrap();
        cache.restore("addr", first);
        assert_eq!(cache.get("addr"), Some(first));

        let again = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(again.sequence, 0);
        assert_eq!(q.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_used() {
        let cache = AccountCache::new(Duration::from_millis(50));
        let q = querier(5);

        cache.query_and_refresh("addr", &q).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("addr").is_none());

        let info = cache.query_and_refresh("addr", &q).await.unwrap();
        assert_eq!(info.sequence, 5);
        assert_eq!(q.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let cache = AccountCache::new(Duration::from_secs(60));
        let q = querier(0);

        cache.query_and_refresh("a", &q).await.unwrap();
        cache.query_and_refresh("a", &q).await.unwrap();
        let b = cache.query_and_refresh("b", &q).await.unwrap();
        assert_eq!(b.sequence, 0);
        assert_eq!(cache.len(), 2);
    }
}
