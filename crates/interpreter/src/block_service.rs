//! Per-block interpretation: load the warm state a block references, run the
//! aggregate, commit everything atomically, then mirror into the caches.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant
};

use ierc_state::{Balance, BalanceKey, PoolAggregate, Tick};
use ierc_storage::{
    cache::{BalanceCache, StakingCache, TickCache},
    BalanceRepository, BlockUpdate, EventRepository, IndexPersistence, StakingRepository,
    TickRepository
};
use ierc_types::{Block, Command, Event, Operate, protocol::ZERO_ADDRESS};
use tracing::info;

use crate::{aggregate::BlockAggregate, ServiceError};

pub struct BlockService {
    events:      Arc<dyn EventRepository>,
    ticks:       Arc<TickCache>,
    balances:    Arc<BalanceCache>,
    pools:       Arc<StakingCache>,
    persistence: Arc<dyn IndexPersistence>,

    invalid_tx_hashes: Arc<HashSet<String>>,
    fee_start_block:   u64,

    last_handled_block: u64
}

impl BlockService {
    pub async fn new(
        events: Arc<dyn EventRepository>,
        ticks: Arc<TickCache>,
        balances: Arc<BalanceCache>,
        pools: Arc<StakingCache>,
        persistence: Arc<dyn IndexPersistence>,
        invalid_tx_hashes: Arc<HashSet<String>>,
        fee_start_block: u64
    ) -> Result<Self, ServiceError> {
        let last_handled_block = events.last_event_block().await?;

        Ok(Self {
            events,
            ticks,
            balances,
            pools,
            persistence,
            invalid_tx_hashes,
            fee_start_block,
            last_handled_block
        })
    }

    pub fn last_handled_block(&self) -> u64 {
        self.last_handled_block
    }

    pub async fn handle_block(&mut self, block: Block) -> Result<(), ServiceError> {
        let started = Instant::now();
        let block_number = block.number;
        info!(
            block_number,
            transactions = block.transactions.len(),
            "start handle block"
        );

        let mut aggregate = self.preload(block).await?;
        aggregate.handle();

        let event_count = aggregate.events.len();
        self.commit(aggregate).await?;

        info!(
            block_number,
            events = event_count,
            duration = ?started.elapsed(),
            "handle block done"
        );

        Ok(())
    }

    /// Builds the aggregate with exactly the state the block references:
    /// ticks, balances and signature events are loaded concurrently, the
    /// staking universe comes in whole from the warm cache.
    async fn preload(&self, block: Block) -> Result<BlockAggregate, ServiceError> {
        let mut aggregate = BlockAggregate::new(
            self.last_handled_block,
            block,
            self.invalid_tx_hashes.clone(),
            self.fee_start_block
        );

        let mut tick_set: HashSet<String> = HashSet::new();
        let mut balance_set: HashSet<BalanceKey> = HashSet::new();
        let mut sign_set: HashSet<String> = HashSet::new();
        let mut unfreeze_signs: HashSet<String> = HashSet::new();

        for tx in &mut aggregate.block.transactions {
            if tx.is_processed {
                continue;
            }

            let Some(command) = &tx.command else {
                tx.is_processed = true;
                continue;
            };

            match command {
                Command::Deploy(cmd) => {
                    tick_set.insert(cmd.tick.clone());
                }
                Command::DeployPoW(cmd) => {
                    tick_set.insert(cmd.tick.clone());
                }
                Command::Mint(cmd) => {
                    tick_set.insert(cmd.tick.clone());
                    balance_set.insert(BalanceKey::new(&cmd.base.from, &cmd.tick));
                }
                Command::MintPoW(cmd) => {
                    tick_set.insert(cmd.tick.clone());
                    balance_set.insert(BalanceKey::new(&cmd.base.from, &cmd.tick));
                    balance_set.insert(BalanceKey::new(ZERO_ADDRESS, &cmd.tick));
                }
                Command::Modify(cmd) => {
                    tick_set.insert(cmd.tick.clone());
                }
                Command::ClaimAirdrop(cmd) => {
                    tick_set.insert(cmd.tick.clone());
                    balance_set.insert(BalanceKey::new(&cmd.base.from, &cmd.tick));
                }
                Command::Transfer(cmd) => {
                    for record in &cmd.records {
                        tick_set.insert(record.tick.clone());
                        balance_set.insert(BalanceKey::new(&record.from, &record.tick));
                        balance_set.insert(BalanceKey::new(&record.recv, &record.tick));
                    }
                }
                Command::FreezeSell(cmd) => {
                    for record in &cmd.records {
                        tick_set.insert(record.tick.clone());
                        balance_set.insert(BalanceKey::new(&record.seller, &record.tick));
                        sign_set.insert(record.seller_sign.clone());
                    }
                }
                Command::UnfreezeSell(cmd) => {
                    for record in &cmd.records {
                        sign_set.insert(record.sign.clone());
                        unfreeze_signs.insert(record.sign.clone());
                    }
                }
                Command::ProxyTransfer(cmd) => {
                    for record in &cmd.records {
                        tick_set.insert(record.tick.clone());
                        balance_set.insert(BalanceKey::new(&record.from, &record.tick));
                        balance_set.insert(BalanceKey::new(&record.to, &record.tick));
                        sign_set.insert(record.sign.clone());
                    }
                }
                Command::ConfigStake(cmd) => {
                    for detail in &cmd.details {
                        tick_set.insert(detail.tick.clone());
                    }
                }
                Command::Staking(cmd) => {
                    for record in &cmd.details {
                        tick_set.insert(record.tick.clone());
                        balance_set.insert(BalanceKey::new(&record.pool, &record.tick));
                        balance_set.insert(BalanceKey::new(&record.staker, &record.tick));
                    }
                }
            }
        }

        aggregate.staking_pools = self.pools.load_all_pools().await?;

        let signs: Vec<String> = sign_set.into_iter().collect();
        let (ticks, balances, signatures) = tokio::try_join!(
            load_ticks(self.ticks.as_ref(), tick_set),
            load_balances(self.balances.as_ref(), balance_set),
            async { Ok::<_, ServiceError>(self.events.events_by_signature(&signs).await?) }
        )?;

        aggregate.ticks = ticks;
        aggregate.balances = balances;
        for (sign, event) in signatures {
            if let Event::Transferred(envelope) = event {
                aggregate.signatures.insert(sign, envelope);
            }
        }

        self.preload_unfreeze_state(&mut aggregate, &unfreeze_signs)
            .await?;

        Ok(aggregate)
    }

    /// An unfreeze only names a signature; the seller's tick and balance
    /// hide behind the freeze event that signature resolves to.
    async fn preload_unfreeze_state(
        &self,
        aggregate: &mut BlockAggregate,
        unfreeze_signs: &HashSet<String>
    ) -> Result<(), ServiceError> {
        let mut tick_set: HashSet<String> = HashSet::new();
        let mut balance_set: HashSet<BalanceKey> = HashSet::new();

        for (sign, envelope) in &aggregate.signatures {
            if !unfreeze_signs.contains(sign) || envelope.data.operate != Operate::FreezeSell {
                continue;
            }

            if !aggregate.ticks.contains_key(&envelope.data.tick) {
                tick_set.insert(envelope.data.tick.clone());
            }

            let key = BalanceKey::new(&envelope.data.from, &envelope.data.tick);
            if !aggregate.balances.contains_key(&key) {
                balance_set.insert(key);
            }
        }

        if tick_set.is_empty() && balance_set.is_empty() {
            return Ok(());
        }

        let (ticks, balances) = tokio::try_join!(
            load_ticks(self.ticks.as_ref(), tick_set),
            load_balances(self.balances.as_ref(), balance_set)
        )?;

        aggregate.ticks.extend(ticks);
        aggregate.balances.extend(balances);

        Ok(())
    }

    /// One atomic write for the whole block, then a best-effort cache
    /// mirror. Only entities the block actually touched are persisted.
    async fn commit(&mut self, aggregate: BlockAggregate) -> Result<(), ServiceError> {
        let block_number = aggregate.block.number;

        let ticks: Vec<Tick> = aggregate
            .ticks
            .into_values()
            .filter(|t| t.last_updated_block() >= block_number)
            .collect();

        let balances: Vec<Balance> = aggregate
            .balances
            .into_values()
            .filter(|b| b.last_updated_block >= block_number)
            .collect();

        let pools: Vec<PoolAggregate> = aggregate.staking_pools.into_values().collect();

        let had_events = !aggregate.events.is_empty();
        let update = BlockUpdate {
            block: aggregate.block,
            events: aggregate.events,
            ticks,
            balances,
            pools
        };

        self.persistence.commit_block(update.clone()).await?;

        self.ticks.apply(&update.ticks);
        self.balances.apply(&update.balances);
        self.pools.apply(&update.pools);

        if had_events {
            self.last_handled_block = block_number;
        }

        Ok(())
    }
}

async fn load_ticks(
    repo: &TickCache,
    names: HashSet<String>
) -> Result<HashMap<String, Tick>, ServiceError> {
    let mut ticks = HashMap::new();
    for name in names {
        if let Some(tick) = TickRepository::load(repo, &name).await? {
            ticks.insert(name, tick);
        }
    }

    Ok(ticks)
}

async fn load_balances(
    repo: &BalanceCache,
    keys: HashSet<BalanceKey>
) -> Result<HashMap<BalanceKey, Balance>, ServiceError> {
    let mut balances = HashMap::new();
    for key in keys {
        if let Some(balance) = BalanceRepository::load(repo, &key).await? {
            balances.insert(key, balance);
        }
    }

    Ok(balances)
}
