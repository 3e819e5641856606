//! Staking pools: a root aggregate per pool address, owning sub-pools and
//! their positions.

mod pool;
mod position;

pub use pool::{PoolTickDetail, StakingPool, StakingPoolDetail};
pub use position::{PositionTickDetail, StakingPosition};

use std::collections::BTreeMap;

use ierc_types::{commands::ConfigStakeCommand, Decimal, ErrCode, ProtocolError};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAggregate {
    pub pool_address: String,
    pub owner:        String,
    pools:            BTreeMap<u64, StakingPool>
}

impl PoolAggregate {
    pub fn new(pool_address: &str, owner: &str) -> Self {
        Self {
            pool_address: pool_address.to_string(),
            owner:        owner.to_string(),
            pools:        BTreeMap::new()
        }
    }

    /// Re-attaches a loaded sub-pool. Ignored when it belongs to a different
    /// pool address.
    pub fn init_pool(&mut self, pool: StakingPool) {
        if pool.pool != self.pool_address {
            return;
        }

        self.pools.insert(pool.pool_sub_id, pool);
    }

    pub fn init_position(&mut self, position: StakingPosition) {
        if let Some(pool) = self.pools.get_mut(&position.pool_sub_id) {
            pool.set_position(position);
        }
    }

    pub fn sub_pool(&self, pool_sub_id: u64) -> Option<&StakingPool> {
        self.pools.get(&pool_sub_id)
    }

    pub fn sub_pools(&self) -> impl Iterator<Item = &StakingPool> {
        self.pools.values()
    }

    pub fn is_admin(&self, pool_sub_id: u64, address: &str) -> bool {
        if address == self.owner {
            return true;
        }

        self.pools
            .get(&pool_sub_id)
            .map(|pool| pool.is_admin(address))
            .unwrap_or(false)
    }

    /// Creates or reconfigures a sub-pool. Only the recorded owner may touch
    /// an existing pool aggregate.
    pub fn update_pool(&mut self, command: &ConfigStakeCommand) -> Result<(), ProtocolError> {
        if command.owner != self.owner {
            return Err(ProtocolError::new(ErrCode::StakeConfigNoPermission, "no permission"));
        }

        if command.pool != self.pool_address {
            return Err(ProtocolError::new(ErrCode::StakeConfigPoolNotMatch, "not match"));
        }

        match self.pools.get_mut(&command.pool_sub_id) {
            Some(pool) => pool.update(command),
            None => {
                let pool = StakingPool::from_config(command);
                self.pools.insert(pool.pool_sub_id, pool);
                Ok(())
            }
        }
    }

    pub fn stake(
        &mut self,
        block_number: u64,
        pool_sub_id: u64,
        staker: &str,
        tick: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        let pool = self
            .pools
            .get_mut(&pool_sub_id)
            .ok_or_else(|| ProtocolError::new(ErrCode::StakingPoolNotFound, "pool not found"))?;

        pool.stake(block_number, staker, tick, amount)
    }

    pub fn unstake(
        &mut self,
        block_number: u64,
        pool_sub_id: u64,
        staker: &str,
        tick: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        let pool = self
            .pools
            .get_mut(&pool_sub_id)
            .ok_or_else(|| ProtocolError::new(ErrCode::StakingPoolNotFound, "pool not found"))?;

        pool.unstake(block_number, staker, tick, amount)
    }

    /// Whether the staker's rewards across every sub-pool cover `amount`.
    pub fn can_use_rewards(&self, block_number: u64, staker: &str, amount: &Decimal) -> bool {
        let mut rewards = Decimal::zero();
        for pool in self.pools.values() {
            rewards = &rewards + &pool.available_rewards(block_number, staker);
        }

        &rewards >= amount
    }

    /// Debits `amount` of rewards, draining sub-pools in turn. The caller
    /// must have gated on [`Self::can_use_rewards`]; running dry here means
    /// the historical state is corrupt.
    pub fn use_rewards(&mut self, block_number: u64, staker: &str, amount: &Decimal) {
        let mut remaining = amount.clone();
        for pool in self.pools.values_mut() {
            let used = pool.use_rewards(block_number, staker, &remaining);
            remaining = &remaining - &used;
            if remaining.is_zero() {
                return;
            }
        }

        panic!(
            "reward shortfall for staker {staker} in pool {}: {remaining} left unconsumed",
            self.pool_address
        );
    }
}
