//! Deploy, mint and tick-maintenance handlers.

use ierc_state::{Ierc20Tick, PowMintParams, PowTick, Tick};
use ierc_types::{
    commands::{
        ClaimAirdropCommand, DeployCommand, DeployPoWCommand, DistributionRule, MintCommand,
        MintPoWCommand, ModifyCommand
    },
    events::{MintedData, PoWMintedData, PoWTickCreatedData, TickCreatedData, TransferredData},
    protocol::{DPOS_MINT_MIN_POINTS, DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT, ZERO_ADDRESS},
    Decimal, ErrCode, Event, ProtocolError
};
use num_traits::Zero;

use super::BlockAggregate;

/// Everything a successful PoW mint produced, for the event payload.
#[derive(Debug, Default)]
struct PowMintOutcome {
    pow_amount:    Decimal,
    pos_amount:    Decimal,
    pow_share:     Decimal,
    pos_share:     Decimal,
    burn_total:    Decimal,
    points_source: String
}

impl BlockAggregate {
    pub(super) fn handle_deploy(&mut self, cmd: &DeployCommand) -> Result<(), ProtocolError> {
        let result = self.apply_deploy(cmd);

        let mut event = Event::TickCreated(self.envelope(&cmd.base, 0, TickCreatedData {
            protocol:     cmd.base.protocol,
            operate:      cmd.base.operate,
            tick:         cmd.tick.clone(),
            decimals:     cmd.decimals,
            max_supply:   cmd.max_supply.clone(),
            limit:        cmd.limit_per_tx.clone(),
            wallet_limit: cmd.limit_per_wallet.clone(),
            work_c:       cmd.work_c.clone(),
            nonce:        cmd.nonce.clone()
        }));
        if let Err(err) = &result {
            event.set_error(err);
        }
        self.events.push(event);

        result
    }

    fn apply_deploy(&mut self, cmd: &DeployCommand) -> Result<(), ProtocolError> {
        if self.ticks.contains_key(&cmd.tick) {
            return Err(ProtocolError::new(ErrCode::TickExited, "tick existed"));
        }

        let tick = Ierc20Tick::from_deploy(cmd);
        self.ticks.insert(cmd.tick.clone(), Tick::Ierc20(tick));
        Ok(())
    }

    pub(super) fn handle_mint(&mut self, cmd: &MintCommand) -> Result<(), ProtocolError> {
        let result = self.apply_mint(cmd);

        let mut event = Event::Minted(self.envelope(&cmd.base, 0, MintedData {
            protocol:      cmd.base.protocol,
            operate:       cmd.base.operate,
            tick:          cmd.tick.clone(),
            from:          cmd.base.from.clone(),
            to:            cmd.base.from.clone(),
            minted_amount: cmd.amount.clone(),
            gas:           cmd.base.gas.clone(),
            gas_price:     cmd.base.gas_price.clone(),
            nonce:         cmd.nonce.clone()
        }));
        if let Err(err) = &result {
            event.set_error(err);
        }
        self.events.push(event);

        result
    }

    fn apply_mint(&mut self, cmd: &MintCommand) -> Result<(), ProtocolError> {
        self.check_tx_hash(&cmd.base.tx_hash)?;

        if cmd.amount <= Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::InvalidProtocolParams, "invalid amount"));
        }

        let tick = self
            .ticks
            .get_mut(&cmd.tick)
            .ok_or_else(|| ProtocolError::new(ErrCode::TickNotExist, "tick not exist"))?;
        let Tick::Ierc20(tick) = tick else {
            return Err(ProtocolError::new(
                ErrCode::MintTickProtocolNoMatch,
                "tick protocol not match"
            ));
        };
        if tick.protocol != cmd.base.protocol {
            return Err(ProtocolError::new(
                ErrCode::MintTickProtocolNoMatch,
                "tick protocol not match"
            ));
        }

        tick.validate_hash(&cmd.base.tx_hash)?;

        if self
            .mint_flags
            .contains(&(cmd.base.from.clone(), cmd.tick.clone()))
        {
            return Err(ProtocolError::new(ErrCode::MintTickMinted, "has been minted"));
        }

        let minted = self
            .balances
            .get(&ierc_state::BalanceKey::new(&cmd.base.from, &cmd.tick))
            .map(|b| b.minted_amount.clone())
            .unwrap_or_default();

        tick.can_mint(&cmd.amount, &minted)?;
        tick.mint(cmd.base.block_number, &cmd.amount);

        let block_number = cmd.base.block_number;
        self.balance_mut(&cmd.base.from, &cmd.tick)
            .add_mint(block_number, &cmd.amount);
        self.mark_minted(&cmd.base.from, &cmd.tick);

        Ok(())
    }

    pub(super) fn handle_deploy_pow(&mut self, cmd: &DeployPoWCommand) -> Result<(), ProtocolError> {
        let result = self.apply_deploy_pow(cmd);

        let mut event = Event::PoWTickCreated(self.envelope(&cmd.base, 0, PoWTickCreatedData {
            protocol:   cmd.base.protocol,
            operate:    cmd.base.operate,
            tick:       cmd.tick.clone(),
            decimals:   cmd.decimals,
            max_supply: cmd.max_supply.clone(),
            tokenomics: cmd.tokenomics.clone(),
            rule:       cmd.rule.clone(),
            creator:    cmd.base.from.clone()
        }));
        if let Err(err) = &result {
            event.set_error(err);
        }
        self.events.push(event);

        result
    }

    fn apply_deploy_pow(&mut self, cmd: &DeployPoWCommand) -> Result<(), ProtocolError> {
        if self.ticks.contains_key(&cmd.tick) {
            return Err(ProtocolError::new(ErrCode::TickExited, "tick existed"));
        }

        // the points side must already have a configured pool to draw from
        if !self.staking_pools.contains_key(&cmd.rule.pos_pool) {
            return Err(ProtocolError::new(ErrCode::StakingPoolNotFound, "pool not found"));
        }

        let tick = PowTick::from_deploy(cmd);
        self.ticks.insert(cmd.tick.clone(), Tick::Pow(tick));
        Ok(())
    }

    pub(super) fn handle_mint_pow(
        &mut self,
        cmd: &MintPoWCommand,
        pow_total: Decimal,
        pos_total: Decimal
    ) -> Result<(), ProtocolError> {
        let result = self.apply_mint_pow(cmd, &pow_total, &pos_total);
        let (outcome, err) = match result {
            Ok(outcome) => (outcome, None),
            Err(err) => (PowMintOutcome::default(), Some(err))
        };

        let mut event = Event::PoWMinted(self.envelope(&cmd.base, 0, PoWMintedData {
            protocol:          cmd.base.protocol,
            operate:           cmd.base.operate,
            tick:              cmd.tick.clone(),
            from:              cmd.base.from.clone(),
            to:                cmd.base.from.clone(),
            is_pow:            cmd.is_pow(),
            pow_minted_amount: outcome.pow_amount.clone(),
            pow_total_share:   pow_total,
            pow_miner_share:   outcome.pow_share.clone(),
            is_pos:            cmd.is_dpos(),
            pos_minted_amount: outcome.pos_amount.clone(),
            pos_total_share:   pos_total,
            pos_miner_share:   outcome.pos_share.clone(),
            pos_points_source: outcome.points_source.clone(),
            gas:               cmd.base.gas.clone(),
            gas_price:         cmd.base.gas_price.clone(),
            is_airdrop:        false,
            airdrop_amount:    Decimal::zero(),
            burn_amount:       outcome.burn_total.clone(),
            nonce:             cmd.nonce.to_string()
        }));
        if let Some(err) = &err {
            event.set_error(err);
        }
        self.events.push(event);

        // burned emissions surface as their own transfer into the zero
        // address, right behind the mint
        if err.is_none() && outcome.burn_total > Decimal::zero() {
            let burn = Event::Transferred(self.envelope(&cmd.base, 1, TransferredData {
                protocol:     cmd.base.protocol,
                operate:      cmd.base.operate,
                tick:         cmd.tick.clone(),
                from:         ZERO_ADDRESS.to_string(),
                to:           ZERO_ADDRESS.to_string(),
                amount:       outcome.burn_total.clone(),
                eth_value:    Decimal::zero(),
                gas_price:    cmd.base.gas_price.clone(),
                nonce:        String::new(),
                signer_nonce: String::new(),
                sign:         String::new()
            }));
            self.events.push(burn);
        }

        match err {
            Some(err) => Err(err),
            None => Ok(())
        }
    }

    fn apply_mint_pow(
        &mut self,
        cmd: &MintPoWCommand,
        pow_total: &Decimal,
        pos_total: &Decimal
    ) -> Result<PowMintOutcome, ProtocolError> {
        if self.is_minted(&cmd.base.from, &cmd.tick) {
            return Err(ProtocolError::new(ErrCode::MintTickMinted, "has been minted"));
        }

        let tick = self
            .ticks
            .get_mut(&cmd.tick)
            .ok_or_else(|| ProtocolError::new(ErrCode::MintTickNotFound, "tick not found"))?;
        let Tick::Pow(tick) = tick else {
            return Err(ProtocolError::new(
                ErrCode::MintTickNotSupportPoW,
                "tick does not support pow"
            ));
        };
        if tick.protocol != cmd.base.protocol {
            return Err(ProtocolError::new(
                ErrCode::MintTickProtocolNoMatch,
                "tick protocol not match"
            ));
        }

        let miner_pow_share = if cmd.is_pow() {
            if cmd.block.abs_diff(cmd.base.block_number) > 5 {
                Decimal::zero()
            } else {
                tick.mint_share_for_hash(cmd.base.block_number, &cmd.base.tx_hash)
            }
        } else {
            Decimal::zero()
        };

        let mut points = if cmd.is_dpos() { cmd.points.clone() } else { Decimal::zero() };

        if cmd.is_dpos()
            && cmd.base.block_number > DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT
            && points < Decimal::from(DPOS_MINT_MIN_POINTS)
        {
            if cmd.is_pow() {
                points = Decimal::zero();
            } else {
                return Err(ProtocolError::new(
                    ErrCode::DposMintPointsTooLow,
                    "mint points too low"
                ));
            }
        }

        if cmd.is_dpos() {
            let pool = self
                .staking_pools
                .get(&tick.rule.pos_pool)
                .unwrap_or_else(|| {
                    panic!("staking pool {} missing for tick {}", tick.rule.pos_pool, tick.tick)
                });

            if !pool.can_use_rewards(cmd.base.block_number, &cmd.base.from, &points) {
                return Err(ProtocolError::new(
                    ErrCode::UseRewardsInsufficient,
                    "insufficient rewards"
                ));
            }
        }

        let params = PowMintParams {
            current_block:   cmd.base.block_number,
            effective_block: cmd.block,
            is_pow:          cmd.is_pow(),
            is_dpos:         cmd.is_dpos(),
            total_pow_share: pow_total.clone(),
            miner_pow_share: miner_pow_share.clone(),
            total_pos_share: pos_total.clone(),
            miner_pos_share: points.clone()
        };
        params.validate()?;
        tick.can_mint(&params)?;

        let (pow_amount, pos_amount) = tick.mint(&params);
        let (pow_burn, pos_burn) = tick.consume_burn();
        let points_source = tick.rule.pos_pool.clone();

        if cmd.is_dpos() && !points.is_zero() {
            let pool = self
                .staking_pools
                .get_mut(&points_source)
                .expect("gated by can_use_rewards");
            pool.use_rewards(cmd.base.block_number, &cmd.base.from, &points);
        }

        let block_number = cmd.base.block_number;
        let minted_total = &pow_amount + &pos_amount;
        self.balance_mut(&cmd.base.from, &cmd.tick)
            .add_mint(block_number, &minted_total);

        let burn_total = &pow_burn + &pos_burn;
        if burn_total > Decimal::zero() {
            self.balance_mut(ZERO_ADDRESS, &cmd.tick)
                .add_available(block_number, &burn_total);
        }

        self.mark_minted(&cmd.base.from, &cmd.tick);

        Ok(PowMintOutcome {
            pow_amount,
            pos_amount,
            pow_share: miner_pow_share,
            pos_share: points,
            burn_total,
            points_source: if cmd.is_dpos() { points_source } else { String::new() }
        })
    }

    pub(super) fn handle_modify(&mut self, cmd: &ModifyCommand) -> Result<(), ProtocolError> {
        let result = self.apply_modify(cmd);

        let mut event =
            Event::PoWTickCreated(self.envelope(&cmd.base, 0, self.pow_tick_snapshot(cmd)));
        if let Err(err) = &result {
            event.set_error(err);
        }
        self.events.push(event);

        result
    }

    fn apply_modify(&mut self, cmd: &ModifyCommand) -> Result<(), ProtocolError> {
        let tick = self
            .ticks
            .get_mut(&cmd.tick)
            .ok_or_else(|| ProtocolError::new(ErrCode::TickNotExist, "tick not exist"))?;
        let Tick::Pow(tick) = tick else {
            return Err(ProtocolError::new(
                ErrCode::TickProtocolNoMatch,
                "tick protocol not match"
            ));
        };
        if tick.protocol != cmd.base.protocol {
            return Err(ProtocolError::new(
                ErrCode::TickProtocolNoMatch,
                "tick protocol not match"
            ));
        }

        tick.update_max_supply(cmd.base.block_number, &cmd.base.from, &cmd.max_supply)
    }

    pub(super) fn handle_claim_airdrop(
        &mut self,
        cmd: &ClaimAirdropCommand
    ) -> Result<(), ProtocolError> {
        let result = self.apply_claim_airdrop(cmd);

        let mut event = Event::PoWMinted(self.envelope(&cmd.base, 0, PoWMintedData {
            protocol:          cmd.base.protocol,
            operate:           cmd.base.operate,
            tick:              cmd.tick.clone(),
            from:              cmd.base.from.clone(),
            to:                cmd.base.from.clone(),
            is_pow:            false,
            pow_minted_amount: Decimal::zero(),
            pow_total_share:   Decimal::zero(),
            pow_miner_share:   Decimal::zero(),
            is_pos:            false,
            pos_minted_amount: Decimal::zero(),
            pos_total_share:   Decimal::zero(),
            pos_miner_share:   Decimal::zero(),
            pos_points_source: String::new(),
            gas:               cmd.base.gas.clone(),
            gas_price:         cmd.base.gas_price.clone(),
            is_airdrop:        true,
            airdrop_amount:    cmd.claim_amount.clone(),
            burn_amount:       Decimal::zero(),
            nonce:             String::new()
        }));
        if let Err(err) = &result {
            event.set_error(err);
        }
        self.events.push(event);

        result
    }

    fn apply_claim_airdrop(&mut self, cmd: &ClaimAirdropCommand) -> Result<(), ProtocolError> {
        let tick = self
            .ticks
            .get_mut(&cmd.tick)
            .ok_or_else(|| ProtocolError::new(ErrCode::TickNotExist, "tick not exist"))?;
        let Tick::Pow(tick) = tick else {
            return Err(ProtocolError::new(
                ErrCode::MintTickNotSupportPoW,
                "tick does not support pow"
            ));
        };
        if tick.protocol != cmd.base.protocol {
            return Err(ProtocolError::new(
                ErrCode::MintTickProtocolNoMatch,
                "tick protocol not match"
            ));
        }

        tick.claim_airdrop(cmd.base.block_number, &cmd.base.from, &cmd.claim_amount)?;

        let block_number = cmd.base.block_number;
        self.balance_mut(&cmd.base.from, &cmd.tick)
            .add_mint(block_number, &cmd.claim_amount);

        Ok(())
    }

    /// Current state of a PoW tick for maintenance events; falls back to the
    /// command data when the tick does not exist.
    fn pow_tick_snapshot(&self, cmd: &ModifyCommand) -> PoWTickCreatedData {
        match self.ticks.get(&cmd.tick) {
            Some(Tick::Pow(tick)) => PoWTickCreatedData {
                protocol:   cmd.base.protocol,
                operate:    cmd.base.operate,
                tick:       tick.tick.clone(),
                decimals:   tick.decimals,
                max_supply: tick.max_supply.clone(),
                tokenomics: tick.tokenomics.clone(),
                rule:       tick.rule.clone(),
                creator:    tick.creator.clone()
            },
            _ => PoWTickCreatedData {
                protocol:   cmd.base.protocol,
                operate:    cmd.base.operate,
                tick:       cmd.tick.clone(),
                decimals:   0,
                max_supply: cmd.max_supply.clone(),
                tokenomics: Vec::new(),
                rule:       DistributionRule {
                    pow_ratio:        Decimal::zero(),
                    min_work_c:       String::new(),
                    difficulty_ratio: Decimal::zero(),
                    pos_ratio:        Decimal::zero(),
                    pos_pool:         String::new(),
                    max_reward_block: 0
                },
                creator:    String::new()
            }
        }
    }
}
