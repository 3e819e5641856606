//! Protocol identifiers, operations and chain-wide constants.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::decimal::{dec, Decimal};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Calldata prefix every inscription payload must start with.
pub const PROTOCOL_HEADER: &str = "data:application/json,";

pub const TICK_ETHI: &str = "ethi";
pub const TICK_ETHPI: &str = "ethpi";

pub const SIGNATURE_TITLE: &str = "ierc-20 one approve";

pub const TICK_MAX_LENGTH: usize = 64;

/// Upper bound accepted for a tick's max supply at deploy time.
pub fn tick_max_supply_limit() -> Decimal {
    dec("9999999999999999999999999999999")
}

/// Multiplier applied to the buyer's required ETH value once the service fee
/// is active.
pub fn service_fee() -> Decimal {
    dec("1.02")
}

#[cfg(not(feature = "sepolia"))]
mod network {
    pub const PLATFORM_ADDRESS: &str = "0x33302dbff493ed81ba2e7e35e2e8e833db023333";

    pub const DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT: u64 = 19_033_750;
    pub const DPOS_DISABLE_DUAL_MINING_BLOCK_HEIGHT: u64 = 19_085_665;
    pub const POW_MINT_LIMIT_BLOCK_HEIGHT: u64 = 19_119_100;
}

#[cfg(feature = "sepolia")]
mod network {
    pub const PLATFORM_ADDRESS: &str = "0x1878d3363a02f1b5e13ce15287c5c29515000656";

    pub const DPOS_MINT_POINTS_LIMIT_BLOCK_HEIGHT: u64 = 0;
    pub const DPOS_DISABLE_DUAL_MINING_BLOCK_HEIGHT: u64 = 5_152_670;
    pub const POW_MINT_LIMIT_BLOCK_HEIGHT: u64 = 5_182_950;
}

pub use network::*;

/// Minimum DPoS points a mint may commit once the points floor is active.
pub const DPOS_MINT_MIN_POINTS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "terc-20")]
    Terc20,
    #[serde(rename = "ierc-20")]
    Ierc20,
    #[serde(rename = "ierc-pow")]
    IercPow
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Terc20 => "terc-20",
            Protocol::Ierc20 => "ierc-20",
            Protocol::IercPow => "ierc-pow"
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terc-20" => Ok(Protocol::Terc20),
            "ierc-20" => Ok(Protocol::Ierc20),
            "ierc-pow" => Ok(Protocol::IercPow),
            _ => Err(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operate {
    Deploy,
    Mint,
    Transfer,
    FreezeSell,
    UnfreezeSell,
    Refund,
    ProxyTransfer,
    StakeConfig,
    Stake,
    Unstake,
    ProxyUnstake,
    Modify,
    AirdropClaim
}

impl Operate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operate::Deploy => "deploy",
            Operate::Mint => "mint",
            Operate::Transfer => "transfer",
            Operate::FreezeSell => "freeze_sell",
            Operate::UnfreezeSell => "unfreeze_sell",
            Operate::Refund => "refund",
            Operate::ProxyTransfer => "proxy_transfer",
            Operate::StakeConfig => "stake_config",
            Operate::Stake => "stake",
            Operate::Unstake => "unstake",
            Operate::ProxyUnstake => "proxy_unstake",
            Operate::Modify => "modify",
            Operate::AirdropClaim => "airdrop_claim"
        }
    }
}

impl fmt::Display for Operate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(Operate::Deploy),
            "mint" => Ok(Operate::Mint),
            "transfer" => Ok(Operate::Transfer),
            "freeze_sell" => Ok(Operate::FreezeSell),
            "unfreeze_sell" => Ok(Operate::UnfreezeSell),
            "refund" => Ok(Operate::Refund),
            "proxy_transfer" => Ok(Operate::ProxyTransfer),
            "stake_config" => Ok(Operate::StakeConfig),
            "stake" => Ok(Operate::Stake),
            "unstake" => Ok(Operate::Unstake),
            "proxy_unstake" => Ok(Operate::ProxyUnstake),
            "modify" => Ok(Operate::Modify),
            "airdrop_claim" => Ok(Operate::AirdropClaim),
            _ => Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for op in [
            Operate::Deploy,
            Operate::Mint,
            Operate::Transfer,
            Operate::FreezeSell,
            Operate::UnfreezeSell,
            Operate::Refund,
            Operate::ProxyTransfer,
            Operate::StakeConfig,
            Operate::Stake,
            Operate::Unstake,
            Operate::ProxyUnstake,
            Operate::Modify,
            Operate::AirdropClaim
        ] {
            assert_eq!(op.as_str().parse::<Operate>(), Ok(op));
        }

        for p in [Protocol::Terc20, Protocol::Ierc20, Protocol::IercPow] {
            assert_eq!(p.as_str().parse::<Protocol>(), Ok(p));
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Protocol::IercPow).unwrap(), "\"ierc-pow\"");
        assert_eq!(serde_json::to_string(&Operate::FreezeSell).unwrap(), "\"freeze_sell\"");
    }

    #[test]
    fn platform_addresses_are_lowercase() {
        assert_eq!(ZERO_ADDRESS.to_lowercase(), ZERO_ADDRESS);
        assert_eq!(PLATFORM_ADDRESS.to_lowercase(), PLATFORM_ADDRESS);
    }
}
