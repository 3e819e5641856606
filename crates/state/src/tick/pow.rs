//! The PoW tick engine: scheduled emissions split between hash-difficulty
//! shares and staked-point shares, with unclaimed emissions burned.

use ierc_types::{
    commands::{DeployPoWCommand, DistributionRule, TokenomicsDetail},
    decimal::min_unit,
    protocol::{DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT, POW_MINT_LIMIT_BLOCK_HEIGHT, TICK_ETHPI},
    Decimal, DecimalExt, ErrCode, ProtocolError, Protocol
};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Counts the leading zero digits of a hex string, ignoring any `0x` prefix.
pub fn count_leading_hex_zeros(hash: &str) -> usize {
    hash.trim_start_matches("0x")
        .chars()
        .take_while(|c| *c == '0')
        .count()
}

/// Inputs of one PoW mint against the rolled-forward tick.
#[derive(Debug, Clone)]
pub struct PowMintParams {
    pub current_block:   u64,
    pub effective_block: u64,
    pub is_pow:          bool,
    pub is_dpos:         bool,
    pub total_pow_share: Decimal,
    pub miner_pow_share: Decimal,
    pub total_pos_share: Decimal,
    pub miner_pos_share: Decimal
}

impl PowMintParams {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.miner_pow_share > self.total_pow_share {
            return Err(ProtocolError::new(ErrCode::Unknown, "miner share > total share"));
        }

        if self.miner_pos_share > self.total_pos_share {
            return Err(ProtocolError::new(ErrCode::Unknown, "miner share > total share"));
        }

        Ok(())
    }

    fn block_skew(&self) -> u64 {
        self.effective_block.abs_diff(self.current_block)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowTick {
    pub tick:            String,
    pub protocol:        Protocol,
    pub decimals:        i64,
    pub tokenomics:      Vec<TokenomicsDetail>,
    pub rule:            DistributionRule,
    pub max_supply:      Decimal,
    pub airdrop_amount:  Decimal,

    pub pow_supply:      Decimal,
    pub pow_last_block:  u64,
    pub pow_burn_amount: Decimal,

    pub pos_supply:      Decimal,
    pub pos_last_block:  u64,
    pub pos_burn_amount: Decimal,

    pub last_update_block: u64,
    pub creator:           String,

    // Per-block scratch, rebuilt by the lazy roll-forward; never persisted.
    #[serde(skip)]
    pow_can_mint:        Decimal,
    #[serde(skip)]
    pow_remain_can_mint: Decimal,
    #[serde(skip)]
    pow_burn:            Decimal,
    #[serde(skip)]
    pos_can_mint:        Decimal,
    #[serde(skip)]
    pos_remain_can_mint: Decimal,
    #[serde(skip)]
    pos_burn:            Decimal
}

impl PowTick {
    pub fn from_deploy(command: &DeployPoWCommand) -> Self {
        Self {
            tick:                command.tick.clone(),
            protocol:            command.base.protocol,
            decimals:            command.decimals,
            tokenomics:          command.tokenomics.clone(),
            rule:                command.rule.clone(),
            max_supply:          command.max_supply.clone(),
            airdrop_amount:      Decimal::zero(),
            pow_supply:          Decimal::zero(),
            pow_last_block:      command.base.block_number,
            pow_burn_amount:     Decimal::zero(),
            pos_supply:          Decimal::zero(),
            pos_last_block:      command.base.block_number,
            pos_burn_amount:     Decimal::zero(),
            last_update_block:   0,
            creator:             command.base.from.clone(),
            pow_can_mint:        Decimal::zero(),
            pow_remain_can_mint: Decimal::zero(),
            pow_burn:            Decimal::zero(),
            pos_can_mint:        Decimal::zero(),
            pos_remain_can_mint: Decimal::zero(),
            pos_burn:            Decimal::zero()
        }
    }

    pub fn last_updated_block(&self) -> u64 {
        self.pow_last_block
            .max(self.pos_last_block)
            .max(self.last_update_block)
    }

    /// Total supply already accounted for: minted on both sides plus the
    /// claimed airdrop.
    pub fn supply(&self) -> Decimal {
        &(&self.pow_supply + &self.pos_supply) + &self.airdrop_amount
    }

    fn remain_supply(&self) -> Decimal {
        &self.max_supply - &self.supply()
    }

    pub fn pow_remain_supply(&self) -> Decimal {
        let pow_max = (&self.max_supply - &self.airdrop_amount) * self.rule.pow_percentage();
        let remain = &pow_max - &self.pow_supply;
        if remain < Decimal::zero() { Decimal::zero() } else { remain }
    }

    pub fn pos_remain_supply(&self) -> Decimal {
        let pos_max = (&self.max_supply - &self.airdrop_amount) * self.rule.pos_percentage();
        let remain = &pos_max - &self.pos_supply;
        if remain < Decimal::zero() { Decimal::zero() } else { remain }
    }

    /// Supply as of `block_number`, counting emissions that are still pending
    /// distribution or burn in the current block.
    pub fn supply_at(&self, block_number: u64) -> Decimal {
        let mut supply = self.supply();

        if block_number == self.pow_last_block {
            supply = &supply + &(&self.pow_remain_can_mint + &self.pow_burn);
        } else {
            let (can_mint, burn) = self.mintable_and_burn(
                self.pow_last_block,
                block_number,
                &self.rule.pow_percentage(),
                self.pow_remain_supply(),
                self.reward_block_num(block_number, true)
            );
            supply = &supply + &(&can_mint + &burn);
        }

        if block_number == self.pos_last_block {
            supply = &supply + &(&self.pos_remain_can_mint + &self.pos_burn);
        } else {
            let (can_mint, burn) = self.mintable_and_burn(
                self.pos_last_block,
                block_number,
                &self.rule.pos_percentage(),
                self.pos_remain_supply(),
                self.reward_block_num(block_number, false)
            );
            supply = &supply + &(&can_mint + &burn);
        }

        supply
    }

    /// Hash-difficulty share: `difficulty_ratio` raised to the number of
    /// leading zeros beyond the minimum work constraint. `ethpi` switches to
    /// fixed ladders at the mainnet cutover heights.
    pub fn mint_share_for_hash(&self, block_number: u64, hash: &str) -> Decimal {
        let curr_difficulty = count_leading_hex_zeros(hash);
        let min_difficulty = count_leading_hex_zeros(&self.rule.min_work_c);

        if curr_difficulty < min_difficulty {
            return Decimal::zero();
        }

        let exp = (curr_difficulty - min_difficulty) as u64;

        if self.tick == TICK_ETHPI {
            if block_number > POW_MINT_LIMIT_BLOCK_HEIGHT {
                return Decimal::from(1u64);
            }
            if block_number > DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT {
                return Decimal::from(5u64).pow_uint(exp);
            }
        }

        self.rule.difficulty_ratio.pow_uint(exp)
    }

    fn reward_block_num(&self, block_number: u64, is_pow: bool) -> u64 {
        if self.tick != TICK_ETHPI || !is_pow {
            return self.rule.max_reward_block;
        }

        if block_number > POW_MINT_LIMIT_BLOCK_HEIGHT {
            return 2;
        }

        self.rule.max_reward_block
    }

    pub fn can_mint(&self, params: &PowMintParams) -> Result<(), ProtocolError> {
        match (params.is_pow, params.is_dpos) {
            (true, true) => {
                if params.miner_pow_share.is_zero() && params.miner_pos_share.is_zero() {
                    return Err(ProtocolError::new(ErrCode::InvalidMint, "invalid mint"));
                }

                if self.remain_supply() <= min_unit() {
                    return Err(ProtocolError::new(
                        ErrCode::MintAmountExceedLimit,
                        "already mint done"
                    ));
                }

                if params.block_skew() > 5 {
                    return Err(ProtocolError::new(ErrCode::MintBlockExpires, "block expires"));
                }
            }
            (true, false) => {
                if params.miner_pow_share.is_zero() {
                    return Err(ProtocolError::new(ErrCode::MintPoWInvalidHash, "invalid hash"));
                }

                if params.block_skew() > 5 {
                    return Err(ProtocolError::new(ErrCode::MintBlockExpires, "block expires"));
                }

                if self.pow_remain_supply() <= min_unit() {
                    return Err(ProtocolError::new(
                        ErrCode::MintAmountExceedLimit,
                        "pow already mint done"
                    ));
                }
            }
            (false, true) => {
                if params.miner_pos_share.is_zero() {
                    return Err(ProtocolError::new(ErrCode::MintPoSInvalidShare, "invalid points"));
                }

                if self.pos_remain_supply() <= min_unit() {
                    return Err(ProtocolError::new(
                        ErrCode::MintAmountExceedLimit,
                        "pos already mint done"
                    ));
                }
            }
            (false, false) => {
                return Err(ProtocolError::new(ErrCode::InvalidMint, "invalid mint"));
            }
        }

        Ok(())
    }

    fn mint_start_block(&self) -> u64 {
        self.tokenomics
            .iter()
            .map(|t| t.block_number)
            .min()
            .unwrap_or(u64::MAX)
    }

    fn output_at(&self, target_block: u64) -> Decimal {
        for detail in self.tokenomics.iter().rev() {
            if target_block >= detail.block_number {
                return detail.amount.clone();
            }
        }

        Decimal::zero()
    }

    /// Walks the emission schedule from `start_block + 1` to `target_block`,
    /// splitting output into the mintable window and the burned tail.
    fn mintable_and_burn(
        &self,
        start_block: u64,
        target_block: u64,
        ratio: &Decimal,
        mut remain_supply: Decimal,
        max_reward_blocks: u64
    ) -> (Decimal, Decimal) {
        let mut can_mint = Decimal::zero();
        let mut burn = Decimal::zero();

        let start_block = start_block.max(self.mint_start_block());
        if start_block == u64::MAX {
            return (can_mint, burn);
        }

        for height in (start_block + 1)..=target_block {
            let output = self.output_at(height) * ratio;
            let real_output = if output < remain_supply { output } else { remain_supply.clone() };

            if max_reward_blocks > 0 && height > start_block + max_reward_blocks {
                burn = &burn + &real_output;
            } else {
                can_mint = &can_mint + &real_output;
            }

            remain_supply = &remain_supply - &real_output;
            if remain_supply.is_zero() {
                break;
            }
        }

        (can_mint, burn)
    }

    /// Lazily rolls the tick forward to the current block, refreshing the
    /// per-block mintable/burn scratch on each side that participates.
    fn roll_forward(&mut self, params: &PowMintParams) {
        if params.is_pow && params.current_block > self.pow_last_block {
            let (can_mint, burn) = self.mintable_and_burn(
                self.pow_last_block,
                params.current_block,
                &self.rule.pow_percentage(),
                self.pow_remain_supply(),
                self.reward_block_num(params.current_block, true)
            );
            self.pow_can_mint = can_mint.clone();
            self.pow_remain_can_mint = can_mint;
            self.pow_burn = burn;
            self.pow_last_block = params.current_block;
        }

        if params.is_dpos && params.current_block > self.pos_last_block {
            let (can_mint, burn) = self.mintable_and_burn(
                self.pos_last_block,
                params.current_block,
                &self.rule.pos_percentage(),
                self.pos_remain_supply(),
                self.reward_block_num(params.current_block, false)
            );
            self.pos_can_mint = can_mint.clone();
            self.pos_remain_can_mint = can_mint;
            self.pos_burn = burn;
            self.pos_last_block = params.current_block;
        }
    }

    /// Mints the caller's proportional slice of the block's mintable
    /// emission. Returns `(pow_amount, pos_amount)`.
    pub fn mint(&mut self, params: &PowMintParams) -> (Decimal, Decimal) {
        self.roll_forward(params);

        let mut pow_amount = Decimal::zero();
        let mut pos_amount = Decimal::zero();

        if !params.total_pow_share.is_zero() && !params.miner_pow_share.is_zero() {
            pow_amount = (&self.pow_can_mint * &params.miner_pow_share / &params.total_pow_share)
                .round_floor(18);
            self.pow_remain_can_mint = &self.pow_remain_can_mint - &pow_amount;
            self.pow_supply = &self.pow_supply + &pow_amount;
        }

        if !params.total_pos_share.is_zero() && !params.miner_pos_share.is_zero() {
            pos_amount = (&self.pos_can_mint * &params.miner_pos_share / &params.total_pos_share)
                .round_floor(18);
            self.pos_remain_can_mint = &self.pos_remain_can_mint - &pos_amount;
            self.pos_supply = &self.pos_supply + &pos_amount;
        }

        (pow_amount, pos_amount)
    }

    /// Closes out the emissions burned during the last roll-forward, folding
    /// them into the supplies so the schedule stays conserved. Returns the
    /// `(pow, pos)` burn just consumed.
    pub fn consume_burn(&mut self) -> (Decimal, Decimal) {
        let mut pow_burn = Decimal::zero();
        let mut pos_burn = Decimal::zero();

        if self.pow_burn > Decimal::zero() {
            pow_burn = std::mem::take(&mut self.pow_burn);
            self.pow_burn_amount = &self.pow_burn_amount + &pow_burn;
            self.pow_supply = &self.pow_supply + &pow_burn;
        }

        if self.pos_burn > Decimal::zero() {
            pos_burn = std::mem::take(&mut self.pos_burn);
            self.pos_burn_amount = &self.pos_burn_amount + &pos_burn;
            self.pos_supply = &self.pos_supply + &pos_burn;
        }

        (pow_burn, pos_burn)
    }

    pub fn update_max_supply(
        &mut self,
        block_number: u64,
        sender: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        if self.creator != sender {
            return Err(ProtocolError::new(
                ErrCode::UpdateMaxSupplyNoPermission,
                "no permission"
            ));
        }

        let supply = self.supply_at(block_number);
        if amount < &supply {
            return Err(ProtocolError::new(
                ErrCode::UpdateAmountLessThanSupply,
                "max amount less than supply"
            ));
        }

        self.max_supply = amount.clone();
        self.last_update_block = block_number;
        Ok(())
    }

    pub fn claim_airdrop(
        &mut self,
        block_number: u64,
        receiver: &str,
        amount: &Decimal
    ) -> Result<(), ProtocolError> {
        if self.creator != receiver {
            return Err(ProtocolError::new(ErrCode::AirdropNoPermission, "no permission"));
        }

        if amount <= &Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::AirdropInvalidAmount, "invalid amount"));
        }

        let supply = self.supply_at(block_number);
        let remain = &self.max_supply - &supply;
        if amount > &remain {
            return Err(ProtocolError::new(
                ErrCode::AirdropAmountExceedsRemainSupply,
                "claim amount exceeds remain supply"
            ));
        }

        self.airdrop_amount = &self.airdrop_amount + amount;
        self.last_update_block = block_number;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ierc_types::{dec, CommandBase, Operate, protocol::ZERO_ADDRESS};

    use super::*;

    fn deploy_at(block: u64, pow_ratio: &str, pos_ratio: &str, max: &str) -> DeployPoWCommand {
        DeployPoWCommand {
            base:       CommandBase {
                block_number:      block,
                tx_hash:           "0x00".to_string(),
                tx_value:          Decimal::zero(),
                position_in_block: 0,
                from:              "0xcafe".to_string(),
                to:                ZERO_ADDRESS.to_string(),
                gas:               Decimal::zero(),
                gas_price:         Decimal::zero(),
                event_at:          0,
                protocol:          Protocol::IercPow,
                operate:           Operate::Deploy
            },
            tick:       "powt".to_string(),
            decimals:   18,
            max_supply: dec(max),
            tokenomics: vec![TokenomicsDetail { block_number: block, amount: dec("1000") }],
            rule:       DistributionRule {
                pow_ratio:        dec(pow_ratio),
                min_work_c:       "0x0000".to_string(),
                difficulty_ratio: dec("5"),
                pos_ratio:        dec(pos_ratio),
                pos_pool:         "0xpool".to_string(),
                max_reward_block: 0
            }
        }
    }

    fn params_pow(current: u64, total: &str, miner: &str) -> PowMintParams {
        PowMintParams {
            current_block:   current,
            effective_block: current,
            is_pow:          true,
            is_dpos:         false,
            total_pow_share: dec(total),
            miner_pow_share: dec(miner),
            total_pos_share: Decimal::zero(),
            miner_pos_share: Decimal::zero()
        }
    }

    #[test]
    fn leading_zero_count() {
        assert_eq!(count_leading_hex_zeros("0x0000ab"), 4);
        assert_eq!(count_leading_hex_zeros("0xab"), 0);
        assert_eq!(count_leading_hex_zeros("000a"), 3);
    }

    #[test]
    fn difficulty_share_ladder() {
        let tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "1000000"));

        // below the work constraint
        assert_eq!(tick.mint_share_for_hash(101, "0x00ab"), dec("0"));
        // exactly at it
        assert_eq!(tick.mint_share_for_hash(101, "0x0000ab"), dec("1"));
        // two digits beyond
        assert_eq!(tick.mint_share_for_hash(101, "0x000000ab"), dec("25"));
    }

    #[test]
    fn proportional_split_between_two_equal_miners() {
        // One block of emission (1000), split 50/50 between sides; two equal
        // miners on the PoW side each take half of the 500.
        let mut tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "1000000"));

        let (first_pow, first_pos) = tick.mint(&params_pow(101, "2", "1"));
        assert_eq!(first_pow, dec("250"));
        assert_eq!(first_pos, dec("0"));

        let (second_pow, _) = tick.mint(&params_pow(101, "2", "1"));
        assert_eq!(second_pow, dec("250"));

        assert_eq!(tick.pow_supply, dec("500"));
        assert_eq!(tick.pos_supply, dec("0"));
    }

    #[test]
    fn emission_caps_at_half_supply() {
        // PoW half is 50; two blocks of 1000 * 50% = 1000 would overshoot.
        let mut tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "100"));

        let (minted, _) = tick.mint(&params_pow(102, "1", "1"));
        assert_eq!(minted, dec("50"));
        assert_eq!(tick.pow_remain_supply(), dec("0"));

        let err = tick.can_mint(&params_pow(103, "1", "1")).unwrap_err();
        assert_eq!(err.code(), ErrCode::MintAmountExceedLimit);
    }

    #[test]
    fn emissions_past_reward_window_burn() {
        let mut deploy = deploy_at(100, "50", "50", "1000000");
        deploy.rule.max_reward_block = 2;
        let mut tick = PowTick::from_deploy(&deploy);

        // Five blocks elapsed: 2 mintable, 3 burned on the PoW side.
        let (minted, _) = tick.mint(&params_pow(105, "1", "1"));
        assert_eq!(minted, dec("1000"));

        let (pow_burn, pos_burn) = tick.consume_burn();
        assert_eq!(pow_burn, dec("1500"));
        assert_eq!(pos_burn, dec("0"));
        assert_eq!(tick.pow_supply, dec("2500"));
        assert_eq!(tick.pow_burn_amount, dec("1500"));

        // burn is one-shot
        let (again, _) = tick.consume_burn();
        assert_eq!(again, dec("0"));
    }

    #[test]
    fn block_skew_expires_mint() {
        let tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "1000000"));

        let mut params = params_pow(110, "1", "1");
        params.effective_block = 104;
        let err = tick.can_mint(&params).unwrap_err();
        assert_eq!(err.code(), ErrCode::MintBlockExpires);

        params.effective_block = 105;
        assert!(tick.can_mint(&params).is_ok());
    }

    #[test]
    fn tokenomics_lookup_uses_latest_entry() {
        let mut deploy = deploy_at(100, "100", "0", "1000000000");
        deploy.tokenomics = vec![
            TokenomicsDetail { block_number: 100, amount: dec("1000") },
            TokenomicsDetail { block_number: 200, amount: dec("500") },
        ];
        let tick = PowTick::from_deploy(&deploy);

        assert_eq!(tick.output_at(99), dec("0"));
        assert_eq!(tick.output_at(150), dec("1000"));
        assert_eq!(tick.output_at(200), dec("500"));
        assert_eq!(tick.output_at(10_000), dec("500"));
    }

    #[test]
    fn max_supply_update_is_creator_gated() {
        let mut tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "1000"));

        let err = tick
            .update_max_supply(101, "0xother", &dec("2000"))
            .unwrap_err();
        assert_eq!(err.code(), ErrCode::UpdateMaxSupplyNoPermission);

        assert!(tick.update_max_supply(101, "0xcafe", &dec("2000")).is_ok());
        assert_eq!(tick.max_supply, dec("2000"));

        // cannot shrink below what block 102 will have emitted
        let err = tick.update_max_supply(102, "0xcafe", &dec("1")).unwrap_err();
        assert_eq!(err.code(), ErrCode::UpdateAmountLessThanSupply);
    }

    #[test]
    fn airdrop_claims_reduce_remaining_supply() {
        let mut tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "10000"));

        let err = tick.claim_airdrop(100, "0xother", &dec("1")).unwrap_err();
        assert_eq!(err.code(), ErrCode::AirdropNoPermission);

        let err = tick.claim_airdrop(100, "0xcafe", &dec("0")).unwrap_err();
        assert_eq!(err.code(), ErrCode::AirdropInvalidAmount);

        let err = tick
            .claim_airdrop(100, "0xcafe", &dec("999999"))
            .unwrap_err();
        assert_eq!(err.code(), ErrCode::AirdropAmountExceedsRemainSupply);

        assert!(tick.claim_airdrop(100, "0xcafe", &dec("100")).is_ok());
        assert_eq!(tick.airdrop_amount, dec("100"));
        assert_eq!(tick.supply(), dec("100"));
    }

    #[test]
    fn scratch_fields_never_serialize() {
        let mut tick = PowTick::from_deploy(&deploy_at(100, "50", "50", "1000000"));
        tick.mint(&params_pow(105, "1", "1"));

        let json = serde_json::to_value(&tick).unwrap();
        assert!(json.get("pow_remain_can_mint").is_none());
        assert!(json.get("pow_can_mint").is_none());
    }
}
