//! Persistence boundary of the indexer.
//!
//! Repositories are narrow async traits so the interpreter never sees a
//! concrete store. The in-memory implementation is the reference store used
//! by the binary and the tests; all writes for one block go through a single
//! atomic [`BlockUpdate`] commit, mirroring the transactional boundary a
//! relational backend would provide.

pub mod cache;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use ierc_state::{Balance, BalanceKey, PoolAggregate, Tick};
use ierc_types::{Block, BlockHeader, Event, EventsByBlock};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage failure: {0}")]
    Internal(String),

    #[error("corrupt stored event: {0}")]
    CorruptEvent(#[from] serde_json::Error)
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Everything one block changed, committed atomically. No partial-block
/// state may ever become visible.
#[derive(Debug, Clone)]
pub struct BlockUpdate {
    pub block:    Block,
    pub events:   Vec<Event>,
    pub ticks:    Vec<Tick>,
    pub balances: Vec<Balance>,
    pub pools:    Vec<PoolAggregate>
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Header of the newest stored block.
    async fn last_indexed_header(&self) -> Result<Option<BlockHeader>>;

    /// Header of the newest fully handled block that carried protocol
    /// transactions.
    async fn last_handled_header(&self) -> Result<Option<BlockHeader>>;

    /// The most advanced header the handle loop is guaranteed to have
    /// passed: the block right before the first pending one, else the newest
    /// processed block.
    async fn next_retriable_header(&self, after: u64) -> Result<Option<BlockHeader>>;

    /// Pending blocks (`tx_count > 0`, not processed) ordered ascending.
    async fn pending_blocks(&self, after: u64, limit: usize) -> Result<Vec<Block>>;

    /// Bulk write of freshly synced blocks.
    async fn save_blocks(&self, blocks: Vec<Block>) -> Result<()>;
}

/// A live event feed: the receiver half of one subscriber's bounded channel.
pub struct EventSubscription {
    id: u64,
    rx: mpsc::Receiver<EventsByBlock>
}

impl EventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn next(&mut self) -> Option<EventsByBlock> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Block number of the most recent persisted event, 0 when none exist.
    async fn last_event_block(&self) -> Result<u64>;

    /// For each signature, the latest successful event that touched it.
    async fn events_by_signature(&self, signs: &[String]) -> Result<HashMap<String, Event>>;

    async fn events_by_hash(&self, hash: &str) -> Result<Vec<Event>>;

    /// Events with `block_number > start_block`, grouped per block. `limit`
    /// bounds the scan but the last block is always returned whole.
    async fn events_by_blocks(&self, start_block: u64, limit: usize) -> Result<Vec<EventsByBlock>>;

    /// Replays history from `start_block`, then keeps streaming live events.
    /// Slow consumers drop updates and must reconcile by re-subscribing.
    async fn subscribe(&self, start_block: u64) -> Result<EventSubscription>;
}

#[async_trait]
pub trait TickRepository: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<Tick>>;
}

#[async_trait]
pub trait BalanceRepository: Send + Sync {
    async fn load(&self, key: &BalanceKey) -> Result<Option<Balance>>;
}

#[async_trait]
pub trait StakingRepository: Send + Sync {
    /// The whole pool universe, keyed by pool address.
    async fn load_all_pools(&self) -> Result<HashMap<String, PoolAggregate>>;
}

#[async_trait]
pub trait IndexPersistence: Send + Sync {
    /// Atomically applies everything a block changed and, once durable,
    /// publishes the block's events to live subscribers.
    async fn commit_block(&self, update: BlockUpdate) -> Result<()>;
}
