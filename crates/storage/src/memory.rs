//! Reference in-memory store.
//!
//! Keeps the whole ledger in process, behind one `RwLock` so a block commit
//! is atomic exactly like a database transaction. Events are persisted the
//! same way a relational backend would hold them: a projection row plus the
//! numeric kind and JSON payload, reconstructed on every read.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc
    }
};

use async_trait::async_trait;
use ierc_protocol::ProtocolParser;
use ierc_state::{Balance, BalanceKey, PoolAggregate, Tick};
use ierc_types::{Block, BlockHeader, Event, EventsByBlock};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    BalanceRepository, BlockRepository, BlockUpdate, EventRepository, EventSubscription,
    IndexPersistence, Result, StakingRepository, TickRepository
};

const SUBSCRIBER_BUFFER: usize = 100;
const REPLAY_PAGE_SIZE: usize = 100;

/// One persisted event row: the query projection next to the payload.
#[derive(Debug, Clone)]
struct StoredEvent {
    block_number: u64,
    tx_hash:      String,
    sign:         String,
    err_code:     i32,
    kind:         u8,
    data:         serde_json::Value
}

impl StoredEvent {
    fn from_event(event: &Event) -> Self {
        let (kind, data) = event.to_kind_and_data();
        Self {
            block_number: event.block_number(),
            tx_hash: event.tx_hash().to_string(),
            sign: event.sign().unwrap_or_default().to_string(),
            err_code: event.err_code(),
            kind,
            data
        }
    }

    fn to_event(&self) -> Result<Event> {
        Ok(Event::from_kind_and_data(self.kind, &self.data)?)
    }
}

#[derive(Default)]
struct Ledger {
    blocks:   BTreeMap<u64, Block>,
    events:   Vec<StoredEvent>,
    ticks:    HashMap<String, Tick>,
    balances: HashMap<BalanceKey, Balance>,
    pools:    HashMap<String, PoolAggregate>
}

struct Shared {
    parser:      ProtocolParser,
    ledger:      RwLock<Ledger>,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<EventsByBlock>>>,
    next_sub_id: AtomicU64
}

#[derive(Clone)]
pub struct MemoryIndexDb {
    shared: Arc<Shared>
}

impl MemoryIndexDb {
    pub fn new(parser: ProtocolParser) -> Self {
        Self {
            shared: Arc::new(Shared {
                parser,
                ledger: RwLock::new(Ledger::default()),
                subscribers: Mutex::new(HashMap::new()),
                next_sub_id: AtomicU64::new(1)
            })
        }
    }

    fn events_page(&self, start_block: u64, limit: usize) -> Result<Vec<EventsByBlock>> {
        let ledger = self.shared.ledger.read();

        let mut selected: Vec<&StoredEvent> = Vec::new();
        for stored in ledger.events.iter().filter(|e| e.block_number > start_block) {
            if selected.len() >= limit {
                // finish the block the limit landed in
                let last_block = selected.last().map(|e| e.block_number).unwrap_or_default();
                if stored.block_number != last_block {
                    break;
                }
            }

            selected.push(stored);
        }

        let mut blocks: Vec<EventsByBlock> = Vec::new();
        for stored in selected {
            let event = stored.to_event()?;
            match blocks.last_mut() {
                Some(group) if group.block_number == stored.block_number => {
                    group.events.push(event)
                }
                _ => blocks.push(EventsByBlock {
                    block_number: stored.block_number,
                    events:       vec![event]
                })
            }
        }

        Ok(blocks)
    }

    /// Offers the block's events to every live subscriber without blocking;
    /// a full channel drops the update, a closed one drops the subscriber.
    fn publish(&self, update: EventsByBlock) {
        let mut subscribers = self.shared.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }

        subscribers.retain(|id, tx| match tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(subscriber = id, "subscriber lagging, dropping update");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false
        });
    }
}

#[async_trait]
impl BlockRepository for MemoryIndexDb {
    async fn last_indexed_header(&self) -> Result<Option<BlockHeader>> {
        let ledger = self.shared.ledger.read();
        Ok(ledger.blocks.values().next_back().map(Block::header))
    }

    async fn last_handled_header(&self) -> Result<Option<BlockHeader>> {
        let ledger = self.shared.ledger.read();
        Ok(ledger
            .blocks
            .values()
            .rev()
            .find(|b| b.transaction_count > 0 && b.is_processed)
            .map(Block::header))
    }

    async fn next_retriable_header(&self, after: u64) -> Result<Option<BlockHeader>> {
        let ledger = self.shared.ledger.read();

        let pending = ledger
            .blocks
            .range(after + 1..)
            .map(|(_, b)| b)
            .find(|b| b.transaction_count > 0 && !b.is_processed);

        if let Some(block) = pending {
            return Ok(Some(BlockHeader {
                number:      block.number - 1,
                hash:        block.parent_hash.clone(),
                parent_hash: String::new()
            }));
        }

        Ok(ledger
            .blocks
            .range(after + 1..)
            .rev()
            .map(|(_, b)| b)
            .find(|b| b.is_processed)
            .map(Block::header))
    }

    async fn pending_blocks(&self, after: u64, limit: usize) -> Result<Vec<Block>> {
        let ledger = self.shared.ledger.read();

        let mut result = Vec::new();
        for (_, block) in ledger.blocks.range(after + 1..) {
            if result.len() >= limit {
                break;
            }

            if block.transaction_count == 0 || block.is_processed {
                continue;
            }

            let mut block = block.clone();
            for tx in &mut block.transactions {
                if tx.is_processed || tx.command.is_some() {
                    continue;
                }

                match self.shared.parser.parse(tx) {
                    Ok(command) => tx.command = Some(command),
                    Err(err) => tx.mark_failed(err.code_value(), err.message())
                }
            }

            result.push(block);
        }

        Ok(result)
    }

    async fn save_blocks(&self, blocks: Vec<Block>) -> Result<()> {
        let mut ledger = self.shared.ledger.write();
        for block in blocks {
            ledger.blocks.insert(block.number, block);
        }

        Ok(())
    }
}

#[async_trait]
impl EventRepository for MemoryIndexDb {
    async fn last_event_block(&self) -> Result<u64> {
        let ledger = self.shared.ledger.read();
        Ok(ledger.events.last().map(|e| e.block_number).unwrap_or(0))
    }

    async fn events_by_signature(&self, signs: &[String]) -> Result<HashMap<String, Event>> {
        let ledger = self.shared.ledger.read();

        let mut result = HashMap::new();
        for sign in signs {
            if sign.is_empty() {
                continue;
            }

            let found = ledger
                .events
                .iter()
                .rev()
                .find(|e| e.err_code == 0 && &e.sign == sign);

            if let Some(stored) = found {
                result.insert(sign.clone(), stored.to_event()?);
            }
        }

        Ok(result)
    }

    async fn events_by_hash(&self, hash: &str) -> Result<Vec<Event>> {
        let ledger = self.shared.ledger.read();
        ledger
            .events
            .iter()
            .filter(|e| e.tx_hash == hash)
            .map(StoredEvent::to_event)
            .collect()
    }

    async fn events_by_blocks(&self, start_block: u64, limit: usize) -> Result<Vec<EventsByBlock>> {
        self.events_page(start_block, limit)
    }

    async fn subscribe(&self, start_block: u64) -> Result<EventSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.shared.next_sub_id.fetch_add(1, Ordering::Relaxed);

        let repo = self.clone();
        tokio::spawn(async move {
            // replay history with backpressure, then go live
            let mut cursor = start_block;
            loop {
                let page = match repo.events_page(cursor, REPLAY_PAGE_SIZE) {
                    Ok(page) => page,
                    Err(err) => {
                        debug!(%err, "event replay aborted");
                        return;
                    }
                };

                if page.is_empty() {
                    break;
                }

                for group in page {
                    cursor = group.block_number;
                    if tx.send(group).await.is_err() {
                        return;
                    }
                }
            }

            repo.shared.subscribers.lock().insert(id, tx);
        });

        Ok(EventSubscription { id, rx })
    }
}

#[async_trait]
impl TickRepository for MemoryIndexDb {
    async fn load(&self, name: &str) -> Result<Option<Tick>> {
        let ledger = self.shared.ledger.read();
        Ok(ledger.ticks.get(name).cloned())
    }
}

#[async_trait]
impl BalanceRepository for MemoryIndexDb {
    async fn load(&self, key: &BalanceKey) -> Result<Option<Balance>> {
        let ledger = self.shared.ledger.read();
        Ok(ledger.balances.get(key).cloned())
    }
}

#[async_trait]
impl StakingRepository for MemoryIndexDb {
    async fn load_all_pools(&self) -> Result<HashMap<String, PoolAggregate>> {
        let ledger = self.shared.ledger.read();
        Ok(ledger.pools.clone())
    }
}

#[async_trait]
impl IndexPersistence for MemoryIndexDb {
    async fn commit_block(&self, update: BlockUpdate) -> Result<()> {
        let block_number = update.block.number;

        {
            let mut ledger = self.shared.ledger.write();

            ledger.blocks.insert(update.block.number, update.block);

            for event in &update.events {
                ledger.events.push(StoredEvent::from_event(event));
            }

            for tick in update.ticks {
                ledger.ticks.insert(tick.name().to_string(), tick);
            }

            for balance in update.balances {
                ledger.balances.insert(balance.key(), balance);
            }

            for pool in update.pools {
                if pool.owner.is_empty() {
                    continue;
                }

                ledger.pools.insert(pool.pool_address.clone(), pool);
            }
        }

        if !update.events.is_empty() {
            self.publish(EventsByBlock { block_number, events: update.events });
        }

        Ok(())
    }
}
