//! The per-block aggregate: every command of one block applied in order
//! against the warm tick/balance/pool state, emitting events as it goes.

mod market;
mod staking;
mod tokens;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc
};

use ierc_state::{Balance, BalanceKey, PoolAggregate, Tick};
use ierc_types::{
    commands::MintPoWCommand,
    events::{Envelope, TransferredData},
    protocol::{DPOS_MINT_MIN_POINTS, DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT},
    Block, Command, CommandBase, Decimal, ErrCode, Event, Operate, ProtocolError
};
use num_traits::Zero;

/// Per-tick share totals accumulated by the PoW pre-pass.
#[derive(Debug, Default, Clone)]
struct TotalShare {
    pow: Decimal,
    pos: Decimal
}

pub struct BlockAggregate {
    pub previous_block: u64,
    pub block:          Block,
    pub ticks:          HashMap<String, Tick>,
    pub balances:       HashMap<BalanceKey, Balance>,
    /// Latest successful transfer event per approval signature; doubles as
    /// the signature lifecycle state.
    pub signatures:     HashMap<String, Envelope<TransferredData>>,
    pub staking_pools:  HashMap<String, PoolAggregate>,
    pub events:         Vec<Event>,

    invalid_tx_hashes: Arc<HashSet<String>>,
    fee_start_block:   u64,
    mint_flags:        HashSet<(String, String)>
}

impl BlockAggregate {
    pub fn new(
        previous_block: u64,
        block: Block,
        invalid_tx_hashes: Arc<HashSet<String>>,
        fee_start_block: u64
    ) -> Self {
        Self {
            previous_block,
            block,
            ticks: HashMap::new(),
            balances: HashMap::new(),
            signatures: HashMap::new(),
            staking_pools: HashMap::new(),
            events: Vec::new(),
            invalid_tx_hashes,
            fee_start_block,
            mint_flags: HashSet::new()
        }
    }

    /// Applies every unprocessed command in transaction order. Protocol
    /// errors land on events and transaction outcomes; nothing aborts the
    /// block.
    pub fn handle(&mut self) {
        let mut transactions = std::mem::take(&mut self.block.transactions);

        let shares = self.compute_pow_shares(&mut transactions);
        self.mint_flags.clear();

        for tx in &mut transactions {
            if tx.is_processed {
                continue;
            }

            tx.is_processed = true;

            let Some(command) = tx.command.clone() else { continue };

            let result = match &command {
                Command::Deploy(cmd) => self.handle_deploy(cmd),
                Command::Mint(cmd) => self.handle_mint(cmd),
                Command::DeployPoW(cmd) => self.handle_deploy_pow(cmd),
                Command::MintPoW(cmd) => {
                    let (pow_total, pos_total) = shares
                        .get(&cmd.tick)
                        .map(|s| (s.pow.clone(), s.pos.clone()))
                        .unwrap_or_default();
                    self.handle_mint_pow(cmd, pow_total, pos_total)
                }
                Command::Modify(cmd) => self.handle_modify(cmd),
                Command::ClaimAirdrop(cmd) => self.handle_claim_airdrop(cmd),
                Command::Transfer(cmd) => self.handle_transfer(cmd),
                Command::FreezeSell(cmd) => self.handle_freeze_sell(cmd),
                Command::UnfreezeSell(cmd) => self.handle_unfreeze_sell(cmd),
                Command::ProxyTransfer(cmd) => self.handle_proxy_transfer(cmd),
                Command::ConfigStake(cmd) => self.handle_config_stake(cmd),
                Command::Staking(cmd) => match cmd.base.operate {
                    Operate::Stake => self.handle_stake(cmd),
                    Operate::Unstake => self.handle_unstake(cmd),
                    Operate::ProxyUnstake => self.handle_proxy_unstake(cmd),
                    _ => Ok(())
                }
            };

            if let Err(err) = result {
                tx.code = err.code_value();
                tx.remark = err.message().to_string();
            }
        }

        self.block.transactions = transactions;
        self.block.is_processed = true;
    }

    /// Pre-pass over the block's PoW mints: totals up the hash and point
    /// shares per tick so the main pass can split emissions proportionally.
    /// In-block double mints are rejected here, silently.
    fn compute_pow_shares(
        &mut self,
        transactions: &mut [ierc_types::Transaction]
    ) -> HashMap<String, TotalShare> {
        let mut shares: HashMap<String, TotalShare> = HashMap::new();

        for tx in transactions.iter_mut() {
            if tx.is_processed {
                continue;
            }

            let Some(Command::MintPoW(cmd)) = &tx.command else { continue };

            let Some(Tick::Pow(tick)) = self.ticks.get(&cmd.tick) else { continue };
            if tick.protocol != cmd.base.protocol {
                continue;
            }

            let pool = self
                .staking_pools
                .get(&tick.rule.pos_pool)
                .unwrap_or_else(|| {
                    panic!("staking pool {} missing for tick {}", tick.rule.pos_pool, tick.tick)
                });

            let entry = shares.entry(cmd.tick.clone()).or_default();

            let flag = (cmd.base.from.clone(), cmd.tick.clone());
            if self.mint_flags.contains(&flag) {
                tx.mark_failed(ErrCode::MintTickMinted.value(), "has been minted");
                continue;
            }

            let can_mint = match (cmd.is_pow(), cmd.is_dpos()) {
                (true, true) => {
                    let share = pre_pass_share(cmd, tick);
                    if share.is_zero() {
                        continue;
                    }

                    let mut points = cmd.points.clone();
                    if cmd.base.block_number > DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT
                        && points < Decimal::from(DPOS_MINT_MIN_POINTS)
                    {
                        points = Decimal::zero();
                    }

                    if !pool.can_use_rewards(cmd.base.block_number, &cmd.base.from, &points) {
                        continue;
                    }

                    entry.pow = &entry.pow + &share;
                    entry.pos = &entry.pos + &points;
                    true
                }

                (false, true) => {
                    let points = cmd.points.clone();
                    if cmd.base.block_number > DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT
                        && points < Decimal::from(DPOS_MINT_MIN_POINTS)
                    {
                        continue;
                    }

                    if !pool.can_use_rewards(cmd.base.block_number, &cmd.base.from, &points) {
                        continue;
                    }

                    entry.pos = &entry.pos + &points;
                    true
                }

                (true, false) => {
                    let share = pre_pass_share(cmd, tick);
                    if share.is_zero() {
                        continue;
                    }

                    entry.pow = &entry.pow + &share;
                    true
                }

                (false, false) => false
            };

            if can_mint {
                self.mint_flags.insert(flag);
            }
        }

        shares
    }

    fn check_tx_hash(&self, tx_hash: &str) -> Result<(), ProtocolError> {
        if self.invalid_tx_hashes.contains(tx_hash) {
            return Err(ProtocolError::new(ErrCode::InvalidTxHash, "invalid tx hash"));
        }

        Ok(())
    }

    fn is_minted(&self, address: &str, tick: &str) -> bool {
        self.mint_flags
            .contains(&(address.to_string(), tick.to_string()))
    }

    fn mark_minted(&mut self, address: &str, tick: &str) {
        self.mint_flags.insert((address.to_string(), tick.to_string()));
    }

    /// Event wrapper for a command at the given per-transaction position.
    fn envelope<T>(&self, base: &CommandBase, position: i32, data: T) -> Envelope<T> {
        Envelope {
            block_number: base.block_number,
            prev_block_number: self.previous_block,
            tx_hash: base.tx_hash.clone(),
            position_in_ierc_txs: position,
            from: base.from.clone(),
            to: base.to.clone(),
            value: base.tx_value.to_string(),
            data,
            err_code: 0,
            err_reason: String::new(),
            event_at: base.event_at
        }
    }

    fn balance_mut(&mut self, address: &str, tick: &str) -> &mut Balance {
        self.balances
            .entry(BalanceKey::new(address, tick))
            .or_insert_with(|| Balance::new(address, tick))
    }
}

/// Hash share of a PoW mint during the pre-pass: zero when the referenced
/// block is more than five blocks away from the containing one.
fn pre_pass_share(cmd: &MintPoWCommand, tick: &ierc_state::PowTick) -> Decimal {
    if cmd.block.abs_diff(cmd.base.block_number) > 5 {
        return Decimal::zero();
    }

    tick.mint_share_for_hash(cmd.base.block_number, &cmd.base.tx_hash)
}

/// Converts an ETH amount to wei.
fn to_wei(amount: &Decimal) -> Decimal {
    amount * ierc_types::dec("1000000000000000000")
}

#[cfg(test)]
mod tests;
