//! Read-through warm caches in front of persistence.
//!
//! The caches are an eventually-consistent mirror: readers consult them
//! first and fall back to the store, writers commit to persistence first and
//! mirror afterwards. They are never authoritative; losing one only costs a
//! reload.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ierc_state::{Balance, BalanceKey, PoolAggregate, Tick};
use parking_lot::Mutex;

use crate::{BalanceRepository, Result, StakingRepository, TickRepository};

pub struct TickCache {
    inner: Arc<dyn TickRepository>,
    cache: Mutex<HashMap<String, Tick>>
}

impl TickCache {
    pub fn new(inner: Arc<dyn TickRepository>) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    /// Mirrors committed ticks into the cache.
    pub fn apply(&self, ticks: &[Tick]) {
        let mut cache = self.cache.lock();
        for tick in ticks {
            cache.insert(tick.name().to_string(), tick.clone());
        }
    }
}

#[async_trait]
impl TickRepository for TickCache {
    async fn load(&self, name: &str) -> Result<Option<Tick>> {
        if let Some(tick) = self.cache.lock().get(name) {
            return Ok(Some(tick.clone()));
        }

        let loaded = self.inner.load(name).await?;
        if let Some(tick) = &loaded {
            self.cache.lock().insert(name.to_string(), tick.clone());
        }

        Ok(loaded)
    }
}

pub struct BalanceCache {
    inner: Arc<dyn BalanceRepository>,
    cache: Mutex<HashMap<BalanceKey, Balance>>
}

impl BalanceCache {
    pub fn new(inner: Arc<dyn BalanceRepository>) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    pub fn apply(&self, balances: &[Balance]) {
        let mut cache = self.cache.lock();
        for balance in balances {
            cache.insert(balance.key(), balance.clone());
        }
    }
}

#[async_trait]
impl BalanceRepository for BalanceCache {
    async fn load(&self, key: &BalanceKey) -> Result<Option<Balance>> {
        if let Some(balance) = self.cache.lock().get(key) {
            return Ok(Some(balance.clone()));
        }

        let loaded = self.inner.load(key).await?;
        if let Some(balance) = &loaded {
            self.cache.lock().insert(key.clone(), balance.clone());
        }

        Ok(loaded)
    }
}

/// Whole-universe mirror of the staking pools, seeded once at startup. The
/// interpreter receives deep copies so uncommitted mutations never leak back.
pub struct StakingCache {
    inner: Arc<dyn StakingRepository>,
    pools: Mutex<HashMap<String, PoolAggregate>>
}

impl StakingCache {
    pub async fn init(inner: Arc<dyn StakingRepository>) -> Result<Self> {
        let pools = inner.load_all_pools().await?;
        Ok(Self { inner, pools: Mutex::new(pools) })
    }

    pub fn apply(&self, pools: &[PoolAggregate]) {
        let mut cache = self.pools.lock();
        for pool in pools {
            if pool.owner.is_empty() {
                continue;
            }

            cache.insert(pool.pool_address.clone(), pool.clone());
        }
    }

    /// Drops the mirror and reloads from persistence.
    pub async fn refresh(&self) -> Result<()> {
        let pools = self.inner.load_all_pools().await?;
        *self.pools.lock() = pools;
        Ok(())
    }
}

#[async_trait]
impl StakingRepository for StakingCache {
    async fn load_all_pools(&self) -> Result<HashMap<String, PoolAggregate>> {
        Ok(self.pools.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use ierc_types::{dec, Protocol};

    use super::*;
    use crate::StorageError;

    struct CountingTickStore {
        loads: Mutex<usize>,
        tick:  Option<Tick>
    }

    #[async_trait]
    impl TickRepository for CountingTickStore {
        async fn load(&self, name: &str) -> Result<Option<Tick>> {
            *self.loads.lock() += 1;
            if name == "missing" {
                return Ok(None);
            }

            self.tick.clone().map(Some).ok_or_else(|| {
                StorageError::Internal("no tick configured".to_string())
            })
        }
    }

    fn sample_tick() -> Tick {
        Tick::Ierc20(ierc_state::Ierc20Tick {
            protocol:           Protocol::Ierc20,
            tick:               "abcd".to_string(),
            max_supply:         dec("100"),
            supply:             dec("0"),
            decimals:           18,
            limit:              dec("10"),
            wallet_limit:       dec("20"),
            work_c:             String::new(),
            creator:            "0x01".to_string(),
            last_updated_block: 1
        })
    }

    #[tokio::test]
    async fn read_through_hits_the_store_once() {
        let store = Arc::new(CountingTickStore {
            loads: Mutex::new(0),
            tick:  Some(sample_tick())
        });
        let cache = TickCache::new(store.clone());

        assert!(cache.load("abcd").await.unwrap().is_some());
        assert!(cache.load("abcd").await.unwrap().is_some());
        assert_eq!(*store.loads.lock(), 1);
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let store = Arc::new(CountingTickStore { loads: Mutex::new(0), tick: None });
        let cache = TickCache::new(store.clone());

        assert!(cache.load("missing").await.unwrap().is_none());
        assert!(cache.load("missing").await.unwrap().is_none());
        assert_eq!(*store.loads.lock(), 2);
    }

    #[tokio::test]
    async fn apply_overwrites_cached_entries() {
        let store = Arc::new(CountingTickStore {
            loads: Mutex::new(0),
            tick:  Some(sample_tick())
        });
        let cache = TickCache::new(store.clone());
        cache.load("abcd").await.unwrap();

        let mut updated = sample_tick();
        if let Tick::Ierc20(t) = &mut updated {
            t.supply = dec("42");
        }
        cache.apply(std::slice::from_ref(&updated));

        let loaded = cache.load("abcd").await.unwrap().unwrap();
        assert_eq!(loaded, updated);
        assert_eq!(*store.loads.lock(), 1);
    }
}
