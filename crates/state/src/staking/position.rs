//! A staker's accumulated position inside one sub-pool.

use std::collections::HashMap;

use ierc_types::{Decimal, ErrCode, ProtocolError};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::pool::PoolTickDetail;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTickDetail {
    pub tick:   String,
    pub ratio:  Decimal,
    pub amount: Decimal
}

/// Rewards accrue linearly: `rewards_per_block` is the sum of
/// `amount * ratio` over the currently staked ticks, and `acc_reward - debt`
/// is what the staker can still spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPosition {
    pub pool:               String,
    pub pool_sub_id:        u64,
    pub staker:             String,
    pub tick_details:       HashMap<String, PositionTickDetail>,
    pub rewards_per_block:  Decimal,
    pub debt:               Decimal,
    pub acc_reward:         Decimal,
    pub last_reward_block:  u64,
    pub last_updated_block: u64
}

impl StakingPosition {
    pub fn new(block_number: u64, pool: &str, pool_sub_id: u64, staker: &str) -> Self {
        Self {
            pool:               pool.to_string(),
            pool_sub_id,
            staker:             staker.to_string(),
            tick_details:       HashMap::new(),
            rewards_per_block:  Decimal::zero(),
            debt:               Decimal::zero(),
            acc_reward:         Decimal::zero(),
            last_reward_block:  block_number,
            last_updated_block: block_number
        }
    }

    fn remaining_rewards(&self) -> Decimal {
        &self.acc_reward - &self.debt
    }

    fn unclaimed_rewards(&self, block_number: u64) -> Decimal {
        if block_number <= self.last_reward_block {
            return Decimal::zero();
        }

        &self.rewards_per_block * Decimal::from(block_number - self.last_reward_block)
    }

    /// Settled surplus plus whatever has accrued since the last settlement.
    pub fn available_rewards(&self, block_number: u64) -> Decimal {
        self.remaining_rewards() + self.unclaimed_rewards(block_number)
    }

    /// Rolls accrued rewards into `acc_reward`. Returns the newly settled
    /// amount.
    pub fn settle_rewards(&mut self, block_number: u64) -> Decimal {
        if block_number <= self.last_reward_block {
            return Decimal::zero();
        }

        let unclaimed = self.unclaimed_rewards(block_number);
        self.acc_reward = &self.acc_reward + &unclaimed;
        self.last_reward_block = block_number;
        unclaimed
    }

    /// Rebuilds `rewards_per_block` against a reconfigured tick table.
    /// Stale ticks that still hold stake are kept with a zero ratio until the
    /// new table says otherwise.
    pub fn reset_rewards_per_block(
        &mut self,
        block_number: u64,
        ticks: &HashMap<String, PoolTickDetail>
    ) {
        let mut rewards_per_block = Decimal::zero();
        let mut details: HashMap<String, PositionTickDetail> = HashMap::new();

        for detail in self.tick_details.values() {
            if detail.amount <= Decimal::zero() {
                continue;
            }

            let mut kept = detail.clone();
            kept.ratio = Decimal::zero();
            details.insert(kept.tick.clone(), kept);
        }

        for item in ticks.values() {
            let detail = details
                .entry(item.tick.clone())
                .and_modify(|d| d.ratio = item.ratio.clone())
                .or_insert_with(|| PositionTickDetail {
                    tick:   item.tick.clone(),
                    ratio:  item.ratio.clone(),
                    amount: Decimal::zero()
                });

            if detail.ratio <= Decimal::zero() || detail.amount <= Decimal::zero() {
                continue;
            }

            rewards_per_block = &rewards_per_block + &(&detail.amount * &detail.ratio);
        }

        self.tick_details = details;
        self.rewards_per_block = rewards_per_block;
        self.last_updated_block = block_number;
    }

    /// Consumes up to `amount` of the settled surplus, returning how much was
    /// actually debited.
    pub fn use_rewards(&mut self, block_number: u64, amount: &Decimal) -> Decimal {
        if amount.is_zero() {
            return Decimal::zero();
        }

        assert!(*amount > Decimal::zero(), "reward consumption must be positive");

        let available = self.remaining_rewards();
        let real_use = if amount < &available { amount.clone() } else { available };

        self.debt = &self.debt + &real_use;
        self.last_updated_block = block_number;
        real_use
    }

    pub fn stake(&mut self, block_number: u64, tick: &str, ratio: &Decimal, amount: &Decimal) {
        let detail = self
            .tick_details
            .entry(tick.to_string())
            .or_insert_with(|| PositionTickDetail {
                tick:   tick.to_string(),
                ratio:  ratio.clone(),
                amount: Decimal::zero()
            });

        detail.amount = &detail.amount + amount;
        self.rewards_per_block = &self.rewards_per_block + &(amount * ratio);
        self.last_updated_block = block_number;
    }

    pub fn unstake(
        &mut self,
        block_number: u64,
        tick: &str,
        ratio: &Decimal,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        let detail = self
            .tick_details
            .get_mut(tick)
            .ok_or_else(|| ProtocolError::new(ErrCode::UnstakingNoStake, "no stake"))?;

        if amount > &detail.amount {
            return Err(ProtocolError::new(
                ErrCode::UnstakingAmountInsufficient,
                "insufficient stake amount"
            ));
        }

        detail.amount = &detail.amount - amount;
        self.rewards_per_block = &self.rewards_per_block - &(amount * ratio);
        self.last_updated_block = block_number;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ierc_types::dec;

    use super::*;

    #[test]
    fn rewards_accrue_linearly() {
        let mut position = StakingPosition::new(1000, "0xpool", 1, "0x01");
        position.stake(1000, "abcd", &dec("0.01"), &dec("100"));
        assert_eq!(position.rewards_per_block, dec("1"));

        assert_eq!(position.available_rewards(1100), dec("100"));
        assert_eq!(position.available_rewards(1000), dec("0"));

        let settled = position.settle_rewards(1100);
        assert_eq!(settled, dec("100"));
        assert_eq!(position.acc_reward, dec("100"));
        assert_eq!(position.last_reward_block, 1100);

        // settling twice at the same height is a no-op
        assert_eq!(position.settle_rewards(1100), dec("0"));
    }

    #[test]
    fn consuming_rewards_raises_debt() {
        let mut position = StakingPosition::new(1000, "0xpool", 1, "0x01");
        position.stake(1000, "abcd", &dec("0.01"), &dec("100"));
        position.settle_rewards(1100);

        let used = position.use_rewards(1100, &dec("60"));
        assert_eq!(used, dec("60"));
        assert_eq!(&position.acc_reward - &position.debt, dec("40"));

        // over-consumption is clamped to what is left
        let used = position.use_rewards(1100, &dec("100"));
        assert_eq!(used, dec("40"));
        assert_eq!(position.available_rewards(1100), dec("0"));
    }

    #[test]
    fn unstake_validates_amounts() {
        let mut position = StakingPosition::new(1000, "0xpool", 1, "0x01");
        position.stake(1000, "abcd", &dec("0.01"), &dec("100"));

        let err = position
            .unstake(1001, "none", &dec("0.01"), &dec("1"))
            .unwrap_err();
        assert_eq!(err.code(), ErrCode::UnstakingNoStake);

        let err = position
            .unstake(1001, "abcd", &dec("0.01"), &dec("101"))
            .unwrap_err();
        assert_eq!(err.code(), ErrCode::UnstakingAmountInsufficient);

        position
            .unstake(1001, "abcd", &dec("0.01"), &dec("40"))
            .unwrap();
        assert_eq!(position.rewards_per_block, dec("0.6"));
    }

    #[test]
    fn reset_keeps_staked_ticks_and_reprices_them() {
        let mut position = StakingPosition::new(1000, "0xpool", 1, "0x01");
        position.stake(1000, "abcd", &dec("0.01"), &dec("100"));
        position.stake(1000, "wxyz", &dec("0.02"), &dec("50"));

        // new table drops wxyz and reprices abcd
        let mut table = HashMap::new();
        table.insert("abcd".to_string(), PoolTickDetail {
            index:          0,
            tick:           "abcd".to_string(),
            ratio:          dec("0.05"),
            amount:         dec("100"),
            max_amount:     dec("0"),
            history_amount: dec("0")
        });

        position.reset_rewards_per_block(1100, &table);

        assert_eq!(position.rewards_per_block, dec("5"));
        // wxyz stake survives with a zero ratio
        let wxyz = &position.tick_details["wxyz"];
        assert_eq!(wxyz.amount, dec("50"));
        assert_eq!(wxyz.ratio, dec("0"));
    }
}
