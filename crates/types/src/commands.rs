//! Typed commands decoded from inscription calldata.
//!
//! A command carries the enclosing transaction's envelope (`CommandBase`)
//! plus the operation-specific payload. Dispatch over the closed set is a
//! single `match` in the block aggregate.

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::{
    decimal::Decimal,
    errors::{ErrCode, ProtocolError},
    protocol::{Operate, Protocol, PLATFORM_ADDRESS, ZERO_ADDRESS}
};

/// Transaction-level context shared by every command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBase {
    pub block_number:      u64,
    pub tx_hash:           String,
    pub tx_value:          Decimal,
    pub position_in_block: i64,
    pub from:              String,
    pub to:                String,
    pub gas:               Decimal,
    pub gas_price:         Decimal,
    pub event_at:          u64,
    pub protocol:          Protocol,
    pub operate:           Operate
}

impl CommandBase {
    /// Envelope-level address rules. `freeze_sell` must target the platform,
    /// `unfreeze_sell`/`proxy_transfer` must originate from it, everything
    /// else must be sent to the zero address.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self.operate {
            Operate::FreezeSell => {
                if self.to != PLATFORM_ADDRESS {
                    return Err(ProtocolError::new(
                        ErrCode::InvalidProtocolParams,
                        "invalid to address. must be platform address"
                    ));
                }
            }
            Operate::UnfreezeSell | Operate::ProxyTransfer => {
                if self.from != PLATFORM_ADDRESS {
                    return Err(ProtocolError::new(
                        ErrCode::InvalidProtocolParams,
                        "invalid from address. must be platform address"
                    ));
                }
            }
            _ => {
                if self.to != ZERO_ADDRESS {
                    return Err(ProtocolError::new(
                        ErrCode::InvalidProtocolParams,
                        "invalid to address. must be zero address"
                    ));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeployCommand {
    pub base:             CommandBase,
    pub tick:             String,
    pub max_supply:       Decimal,
    pub decimals:         i64,
    pub limit_per_tx:     Decimal,
    pub limit_per_wallet: Decimal,
    pub work_c:           String,
    pub nonce:            String
}

#[derive(Debug, Clone)]
pub struct MintCommand {
    pub base:   CommandBase,
    pub tick:   String,
    pub amount: Decimal,
    pub nonce:  String
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub tick:   String,
    pub from:   String,
    pub recv:   String,
    pub amount: Decimal
}

#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub base:    CommandBase,
    pub records: Vec<TransferRecord>
}

#[derive(Debug, Clone)]
pub struct FreezeRecord {
    pub tick:        String,
    pub platform:    String,
    pub seller:      String,
    pub seller_sign: String,
    pub sign_nonce:  String,
    pub amount:      Decimal,
    pub value:       Decimal,
    pub gas_price:   Decimal
}

#[derive(Debug, Clone)]
pub struct FreezeSellCommand {
    pub base:    CommandBase,
    pub records: Vec<FreezeRecord>
}

#[derive(Debug, Clone)]
pub struct UnfreezeRecord {
    pub tx_hash:  String,
    pub position: i32,
    pub sign:     String,
    pub msg:      String
}

#[derive(Debug, Clone)]
pub struct UnfreezeSellCommand {
    pub base:    CommandBase,
    pub records: Vec<UnfreezeRecord>
}

#[derive(Debug, Clone)]
pub struct ProxyTransferRecord {
    pub tick:         String,
    pub from:         String,
    pub to:           String,
    pub amount:       Decimal,
    pub value:        Decimal,
    pub sign:         String,
    pub signer_nonce: String
}

#[derive(Debug, Clone)]
pub struct ProxyTransferCommand {
    pub base:    CommandBase,
    pub records: Vec<ProxyTransferRecord>
}

/// One entry of a PoW tick's emission schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenomicsDetail {
    pub block_number: u64,
    pub amount:       Decimal
}

/// How a PoW tick splits emissions between hash work and staked points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRule {
    pub pow_ratio:        Decimal,
    pub min_work_c:       String,
    pub difficulty_ratio: Decimal,
    pub pos_ratio:        Decimal,
    pub pos_pool:         String,
    pub max_reward_block: u64
}

impl DistributionRule {
    pub fn pow_percentage(&self) -> Decimal {
        &self.pow_ratio / (&self.pow_ratio + &self.pos_ratio)
    }

    pub fn pos_percentage(&self) -> Decimal {
        &self.pos_ratio / (&self.pow_ratio + &self.pos_ratio)
    }
}

#[derive(Debug, Clone)]
pub struct DeployPoWCommand {
    pub base:       CommandBase,
    pub tick:       String,
    pub decimals:   i64,
    pub max_supply: Decimal,
    pub tokenomics: Vec<TokenomicsDetail>,
    pub rule:       DistributionRule
}

#[derive(Debug, Clone)]
pub struct MintPoWCommand {
    pub base:   CommandBase,
    pub tick:   String,
    pub points: Decimal,
    pub block:  u64,
    pub nonce:  u64
}

impl MintPoWCommand {
    /// The command competes for the hash-difficulty share when it carries an
    /// explicit block reference.
    pub fn is_pow(&self) -> bool {
        self.block != 0
    }

    /// The command consumes staking points when it commits a non-zero amount
    /// of them.
    pub fn is_dpos(&self) -> bool {
        !self.points.is_zero()
    }
}

#[derive(Debug, Clone)]
pub struct ModifyCommand {
    pub base:       CommandBase,
    pub tick:       String,
    pub max_supply: Decimal
}

#[derive(Debug, Clone)]
pub struct ClaimAirdropCommand {
    pub base:         CommandBase,
    pub tick:         String,
    pub claim_amount: Decimal
}

/// Per-tick reward terms inside a staking sub-pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickConfigDetail {
    pub tick:       String,
    pub ratio:      Decimal,
    pub max_amount: Decimal
}

#[derive(Debug, Clone)]
pub struct ConfigStakeCommand {
    pub base:        CommandBase,
    pub pool:        String,
    pub pool_sub_id: u64,
    pub name:        String,
    pub owner:       String,
    pub admins:      Vec<String>,
    pub stop_block:  u64,
    pub details:     Vec<TickConfigDetail>
}

#[derive(Debug, Clone)]
pub struct StakingDetail {
    pub staker: String,
    pub pool:   String,
    pub pool_sub_id: u64,
    pub tick:   String,
    pub amount: Decimal
}

/// Covers `stake`, `unstake` and `proxy_unstake`; the three are told apart by
/// the envelope operate.
#[derive(Debug, Clone)]
pub struct StakingCommand {
    pub base:        CommandBase,
    pub pool:        String,
    pub pool_sub_id: u64,
    pub details:     Vec<StakingDetail>
}

#[derive(Debug, Clone)]
pub enum Command {
    Deploy(DeployCommand),
    Mint(MintCommand),
    DeployPoW(DeployPoWCommand),
    MintPoW(MintPoWCommand),
    Modify(ModifyCommand),
    ClaimAirdrop(ClaimAirdropCommand),
    Transfer(TransferCommand),
    FreezeSell(FreezeSellCommand),
    UnfreezeSell(UnfreezeSellCommand),
    ProxyTransfer(ProxyTransferCommand),
    ConfigStake(ConfigStakeCommand),
    Staking(StakingCommand)
}

impl Command {
    pub fn base(&self) -> &CommandBase {
        match self {
            Command::Deploy(c) => &c.base,
            Command::Mint(c) => &c.base,
            Command::DeployPoW(c) => &c.base,
            Command::MintPoW(c) => &c.base,
            Command::Modify(c) => &c.base,
            Command::ClaimAirdrop(c) => &c.base,
            Command::Transfer(c) => &c.base,
            Command::FreezeSell(c) => &c.base,
            Command::UnfreezeSell(c) => &c.base,
            Command::ProxyTransfer(c) => &c.base,
            Command::ConfigStake(c) => &c.base,
            Command::Staking(c) => &c.base
        }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        self.base().validate()
    }
}
