//! Staking handlers: pool configuration, stake, unstake and the
//! admin-driven proxy unstake.

use ierc_state::PoolAggregate;
use ierc_types::{
    commands::{ConfigStakeCommand, StakingCommand, StakingDetail},
    events::{StakingPoolUpdatedData, TransferredData},
    CommandBase, Decimal, ErrCode, Event, ProtocolError
};
use num_traits::Zero;

use super::BlockAggregate;

impl BlockAggregate {
    pub(super) fn handle_config_stake(
        &mut self,
        cmd: &ConfigStakeCommand
    ) -> Result<(), ProtocolError> {
        let result = self.apply_config_stake(cmd);

        let mut event =
            Event::StakingPoolUpdated(self.envelope(&cmd.base, 0, StakingPoolUpdatedData {
                protocol:   cmd.base.protocol,
                operate:    cmd.base.operate,
                from:       cmd.base.from.clone(),
                to:         cmd.base.to.clone(),
                pool:       cmd.pool.clone(),
                pool_id:    cmd.pool_sub_id,
                name:       cmd.name.clone(),
                owner:      cmd.owner.clone(),
                admins:     cmd.admins.clone(),
                details:    cmd.details.clone(),
                stop_block: cmd.stop_block
            }));
        if let Err(err) = &result {
            event.set_error(err);
        }
        self.events.push(event);

        result
    }

    fn apply_config_stake(&mut self, cmd: &ConfigStakeCommand) -> Result<(), ProtocolError> {
        let aggregate = self
            .staking_pools
            .entry(cmd.pool.clone())
            .or_insert_with(|| PoolAggregate::new(&cmd.pool, &cmd.owner));

        aggregate.update_pool(cmd)
    }

    pub(super) fn handle_stake(&mut self, cmd: &StakingCommand) -> Result<(), ProtocolError> {
        self.handle_staking_records(cmd, |aggregate, base, record| {
            Self::check_positive(record)?;
            aggregate.stake(
                base.block_number,
                record.pool_sub_id,
                &record.staker,
                &record.tick,
                &record.amount
            )
        })
    }

    pub(super) fn handle_unstake(&mut self, cmd: &StakingCommand) -> Result<(), ProtocolError> {
        self.handle_staking_records(cmd, |aggregate, base, record| {
            Self::check_positive(record)?;
            aggregate.unstake(
                base.block_number,
                record.pool_sub_id,
                &record.staker,
                &record.tick,
                &record.amount
            )
        })
    }

    pub(super) fn handle_proxy_unstake(&mut self, cmd: &StakingCommand) -> Result<(), ProtocolError> {
        let from = cmd.base.from.clone();
        let sub_id = cmd.pool_sub_id;

        self.handle_staking_records(cmd, move |aggregate, base, record| {
            Self::check_positive(record)?;

            if !aggregate.is_admin(sub_id, &from) {
                return Err(ProtocolError::new(ErrCode::ProxyUnstakingNotAdmin, "not admin"));
            }

            aggregate.unstake(
                base.block_number,
                record.pool_sub_id,
                &record.staker,
                &record.tick,
                &record.amount
            )
        })
    }

    fn check_positive(record: &StakingDetail) -> Result<(), ProtocolError> {
        if record.amount <= Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::InvalidProtocolParams, "invalid amount"));
        }

        Ok(())
    }

    /// Drives every staking record through `op`, then settles the matching
    /// balance move. Records are independent; the transaction outcome
    /// mirrors the first failure.
    fn handle_staking_records<F>(
        &mut self,
        cmd: &StakingCommand,
        mut op: F
    ) -> Result<(), ProtocolError>
    where
        F: FnMut(&mut PoolAggregate, &CommandBase, &StakingDetail) -> Result<(), ProtocolError>
    {
        let mut first_err: Option<ProtocolError> = None;
        let unstaking = cmd.base.operate != ierc_types::Operate::Stake;

        for (position, record) in cmd.details.iter().enumerate() {
            let result = self.apply_staking_record(&cmd.base, record, unstaking, &mut op);

            // stake moves funds towards the pool, unstake back to the staker
            let (from, to) = if unstaking {
                (record.pool.clone(), record.staker.clone())
            } else {
                (record.staker.clone(), record.pool.clone())
            };

            let mut event =
                Event::Transferred(self.envelope(&cmd.base, position as i32, TransferredData {
                    protocol: cmd.base.protocol,
                    operate: cmd.base.operate,
                    tick: record.tick.clone(),
                    from,
                    to,
                    amount: record.amount.clone(),
                    eth_value: Decimal::zero(),
                    gas_price: cmd.base.gas_price.clone(),
                    nonce: String::new(),
                    signer_nonce: String::new(),
                    sign: String::new()
                }));

            if let Err(err) = &result {
                event.set_error(err);
                first_err.get_or_insert_with(|| err.clone());
            }

            self.events.push(event);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(())
        }
    }

    fn apply_staking_record<F>(
        &mut self,
        base: &CommandBase,
        record: &StakingDetail,
        unstaking: bool,
        op: &mut F
    ) -> Result<(), ProtocolError>
    where
        F: FnMut(&mut PoolAggregate, &CommandBase, &StakingDetail) -> Result<(), ProtocolError>
    {
        if !self.staking_pools.contains_key(&record.pool) {
            return Err(ProtocolError::new(ErrCode::StakingPoolNotFound, "pool not found"));
        }

        if !unstaking {
            // the staker must be able to cover the stake before the pool is touched
            let available = self
                .balances
                .get(&ierc_state::BalanceKey::new(&record.staker, &record.tick))
                .map(|b| b.available.clone())
                .unwrap_or_default();
            if available < record.amount {
                return Err(ProtocolError::new(
                    ErrCode::InsufficientAvailableFunds,
                    "insufficient available funds"
                ));
            }
        }

        let aggregate = self
            .staking_pools
            .get_mut(&record.pool)
            .expect("existence checked above");

        op(aggregate, base, record)?;

        if unstaking {
            let pool_balance = self.balance_mut(&record.pool, &record.tick);
            if pool_balance.freeze < record.amount {
                panic!(
                    "pool {} freeze balance inconsistent for tick {}: {} < {}",
                    record.pool, record.tick, pool_balance.freeze, record.amount
                );
            }

            pool_balance.sub_freeze(base.block_number, &record.amount);
            self.balance_mut(&record.staker, &record.tick)
                .add_available(base.block_number, &record.amount);
        } else {
            self.balance_mut(&record.staker, &record.tick)
                .sub_available(base.block_number, &record.amount);
            self.balance_mut(&record.pool, &record.tick)
                .add_freeze(base.block_number, &record.amount);
        }

        Ok(())
    }
}
