//! A sub-pool: reward terms per tick plus the positions staked into them.

use std::collections::HashMap;

use ierc_types::{commands::ConfigStakeCommand, Decimal, ErrCode, ProtocolError};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::position::StakingPosition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolTickDetail {
    #[serde(rename = "idx")]
    pub index:          usize,
    pub tick:           String,
    pub ratio:          Decimal,
    pub amount:         Decimal,
    pub max_amount:     Decimal,
    pub history_amount: Decimal
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPoolDetail {
    pub name:         String,
    pub owner:        String,
    pub admins:       Vec<String>,
    pub start_block:  u64,
    /// Zero means the sub-pool never ends.
    pub stop_block:   u64,
    #[serde(rename = "details")]
    pub tick_details: HashMap<String, PoolTickDetail>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPool {
    pub pool:               String,
    pub pool_sub_id:        u64,
    pub detail:             StakingPoolDetail,
    pub last_updated_block: u64,

    #[serde(skip)]
    positions: HashMap<String, StakingPosition>
}

impl StakingPool {
    pub fn from_config(command: &ConfigStakeCommand) -> Self {
        let mut tick_details = HashMap::new();
        for (index, item) in command.details.iter().enumerate() {
            tick_details.insert(item.tick.clone(), PoolTickDetail {
                index,
                tick:           item.tick.clone(),
                ratio:          item.ratio.clone(),
                amount:         Decimal::zero(),
                max_amount:     item.max_amount.clone(),
                history_amount: Decimal::zero()
            });
        }

        Self {
            pool:               command.pool.clone(),
            pool_sub_id:        command.pool_sub_id,
            detail:             StakingPoolDetail {
                name:         command.name.clone(),
                owner:        command.owner.clone(),
                admins:       command.admins.clone(),
                start_block:  command.base.block_number,
                stop_block:   command.stop_block,
                tick_details
            },
            last_updated_block: command.base.block_number,
            positions:          HashMap::new()
        }
    }

    pub fn position(&self, staker: &str) -> Option<&StakingPosition> {
        self.positions.get(staker)
    }

    pub fn positions(&self) -> impl Iterator<Item = &StakingPosition> {
        self.positions.values()
    }

    pub fn set_position(&mut self, position: StakingPosition) {
        self.positions.insert(position.staker.clone(), position);
    }

    pub fn is_admin(&self, address: &str) -> bool {
        address == self.detail.owner || self.detail.admins.iter().any(|a| a == address)
    }

    pub fn is_time_limited(&self) -> bool {
        self.detail.stop_block != 0
    }

    pub fn is_ended(&self, current_block: u64) -> bool {
        self.detail.stop_block != 0 && self.detail.stop_block < current_block
    }

    fn can_stake(
        &self,
        block_number: u64,
        tick: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        let detail = self.detail.tick_details.get(tick).ok_or_else(|| {
            ProtocolError::new(ErrCode::StakingTickUnsupported, "tick unsupported")
        })?;

        if detail.ratio <= Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::StakingTickUnsupported, "tick unsupported"));
        }

        if self.is_time_limited() {
            if block_number >= self.detail.stop_block {
                return Err(ProtocolError::new(
                    ErrCode::StakingPoolAlreadyStopped,
                    "pool already stopped"
                ));
            }

            if &(&detail.max_amount - &detail.amount) < amount {
                return Err(ProtocolError::new(ErrCode::StakingPoolIsFulled, "pool is fulled"));
            }
        }

        Ok(())
    }

    fn can_unstake(
        &self,
        block_number: u64,
        tick: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        let detail = self.detail.tick_details.get(tick).ok_or_else(|| {
            ProtocolError::new(ErrCode::StakingTickUnsupported, "tick unsupported")
        })?;

        if &detail.amount < amount {
            return Err(ProtocolError::new(
                ErrCode::UnstakingAmountInsufficient,
                "invalid amount"
            ));
        }

        // funds in a time-limited pool unlock only after it stops
        if self.is_time_limited() && block_number <= self.detail.stop_block {
            return Err(ProtocolError::new(ErrCode::UnstakingNotYetUnlocked, "not yet unlocked"));
        }

        Ok(())
    }

    /// Rewards the staker could consume at `block_number`, capped at the
    /// stop block for time-limited pools.
    pub fn available_rewards(&self, block_number: u64, staker: &str) -> Decimal {
        let Some(position) = self.position(staker) else {
            return Decimal::zero();
        };

        let block_number = if self.is_time_limited() {
            block_number.min(self.detail.stop_block)
        } else {
            block_number
        };

        position.available_rewards(block_number)
    }

    pub fn update(&mut self, command: &ConfigStakeCommand) -> Result<(), ProtocolError> {
        if self.is_time_limited() {
            self.update_time_limited(command)
        } else {
            self.update_unlimited(command)
        }
    }

    fn update_unlimited(&mut self, command: &ConfigStakeCommand) -> Result<(), ProtocolError> {
        let mut tick_details: HashMap<String, PoolTickDetail> = HashMap::new();
        for info in self.detail.tick_details.values() {
            if info.amount <= Decimal::zero() {
                continue;
            }

            let mut kept = info.clone();
            kept.ratio = Decimal::zero();
            tick_details.insert(kept.tick.clone(), kept);
        }

        for (index, item) in command.details.iter().enumerate() {
            tick_details
                .entry(item.tick.clone())
                .and_modify(|tick| {
                    tick.index = index;
                    tick.ratio = item.ratio.clone();
                })
                .or_insert_with(|| PoolTickDetail {
                    index,
                    tick:           item.tick.clone(),
                    ratio:          item.ratio.clone(),
                    amount:         Decimal::zero(),
                    max_amount:     Decimal::zero(),
                    history_amount: Decimal::zero()
                });
        }

        self.apply_update(command, tick_details);
        Ok(())
    }

    fn update_time_limited(&mut self, command: &ConfigStakeCommand) -> Result<(), ProtocolError> {
        if self.is_ended(command.base.block_number) {
            return Err(ProtocolError::new(ErrCode::StakingPoolIsEnded, "pool is ended"));
        }

        let mut tick_details: HashMap<String, PoolTickDetail> = HashMap::new();
        for info in self.detail.tick_details.values() {
            if info.amount <= Decimal::zero() {
                continue;
            }

            let mut kept = info.clone();
            kept.ratio = Decimal::zero();
            kept.max_amount = Decimal::zero();
            tick_details.insert(kept.tick.clone(), kept);
        }

        for (index, item) in command.details.iter().enumerate() {
            match tick_details.get_mut(&item.tick) {
                Some(tick) => {
                    if item.max_amount < tick.amount {
                        return Err(ProtocolError::new(
                            ErrCode::StakingPoolMaxAmountLessThanCurrentAmount,
                            "max amount less than current amount"
                        ));
                    }

                    tick.index = index;
                    tick.ratio = item.ratio.clone();
                    tick.max_amount = item.max_amount.clone();
                }
                None => {
                    tick_details.insert(item.tick.clone(), PoolTickDetail {
                        index,
                        tick:           item.tick.clone(),
                        ratio:          item.ratio.clone(),
                        amount:         Decimal::zero(),
                        max_amount:     item.max_amount.clone(),
                        history_amount: Decimal::zero()
                    });
                }
            }
        }

        self.apply_update(command, tick_details);
        Ok(())
    }

    fn apply_update(
        &mut self,
        command: &ConfigStakeCommand,
        tick_details: HashMap<String, PoolTickDetail>
    ) {
        let block_number = command.base.block_number;
        let settle_block = if self.is_time_limited() {
            block_number.min(self.detail.stop_block)
        } else {
            block_number
        };

        for position in self.positions.values_mut() {
            position.settle_rewards(settle_block);
            position.reset_rewards_per_block(block_number, &tick_details);
        }

        self.detail.name = command.name.clone();
        self.detail.tick_details = tick_details;
        self.detail.admins = command.admins.clone();
        self.last_updated_block = block_number;
    }

    pub fn stake(
        &mut self,
        block_number: u64,
        staker: &str,
        tick: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        self.can_stake(block_number, tick, amount)?;

        let time_limited = self.is_time_limited();
        let settle_block = if time_limited {
            block_number.min(self.detail.stop_block)
        } else {
            block_number
        };

        let detail = self
            .detail
            .tick_details
            .get_mut(tick)
            .expect("checked by can_stake");

        let position = self
            .positions
            .entry(staker.to_string())
            .or_insert_with(|| StakingPosition::new(block_number, &self.pool, self.pool_sub_id, staker));
        position.settle_rewards(settle_block);
        position.stake(block_number, tick, &detail.ratio, amount);

        detail.amount = &detail.amount + amount;
        if time_limited {
            detail.history_amount = &detail.history_amount + amount;
        }
        self.last_updated_block = block_number;

        Ok(())
    }

    pub fn unstake(
        &mut self,
        block_number: u64,
        staker: &str,
        tick: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        self.can_unstake(block_number, tick, amount)?;

        let settle_block = if self.is_time_limited() {
            block_number.min(self.detail.stop_block)
        } else {
            block_number
        };

        let detail = self
            .detail
            .tick_details
            .get_mut(tick)
            .expect("checked by can_unstake");

        let position = self
            .positions
            .get_mut(staker)
            .ok_or_else(|| ProtocolError::new(ErrCode::UnstakingNoStake, "no stake"))?;

        position.settle_rewards(settle_block);
        position.unstake(block_number, tick, &detail.ratio, amount)?;

        detail.amount = &detail.amount - amount;
        self.last_updated_block = block_number;

        Ok(())
    }

    /// Settles and debits up to `amount` from the staker's position,
    /// returning what was actually consumed.
    pub fn use_rewards(&mut self, block_number: u64, staker: &str, amount: &Decimal) -> Decimal {
        let settle_block = if self.is_time_limited() {
            block_number.min(self.detail.stop_block)
        } else {
            block_number
        };

        let Some(position) = self.positions.get_mut(staker) else {
            return Decimal::zero();
        };

        position.settle_rewards(settle_block);
        position.use_rewards(block_number, amount)
    }
}
