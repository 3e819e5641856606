//! The legacy mint-limited tick.

use ierc_types::{
    commands::DeployCommand,
    dec, Decimal, ErrCode, ProtocolError, Protocol
};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ierc20Tick {
    pub protocol:           Protocol,
    pub tick:               String,
    pub max_supply:         Decimal,
    pub supply:             Decimal,
    pub decimals:           i64,
    /// Per-transaction mint cap.
    pub limit:              Decimal,
    /// Cumulative per-address mint cap.
    pub wallet_limit:       Decimal,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub work_c:             String,
    pub creator:            String,
    pub last_updated_block: u64
}

impl Ierc20Tick {
    pub fn from_deploy(command: &DeployCommand) -> Self {
        // Two early ticks shipped with a different max supply than their
        // inscriptions declared; the ledger keeps honoring the shipped values.
        let max_supply = match command.tick.as_str() {
            "ierc-m4" => dec("21016000"),
            "ierc-m5" => dec("24874936"),
            _ => command.max_supply.clone()
        };

        Self {
            protocol:           command.base.protocol,
            tick:               command.tick.clone(),
            max_supply,
            supply:             Decimal::zero(),
            decimals:           command.decimals,
            limit:              command.limit_per_tx.clone(),
            wallet_limit:       command.limit_per_wallet.clone(),
            work_c:             command.work_c.clone(),
            creator:            command.base.from.clone(),
            last_updated_block: command.base.block_number
        }
    }

    /// Checks the transaction hash against the tick's work constraint.
    pub fn validate_hash(&self, hash: &str) -> Result<(), ProtocolError> {
        if !self.work_c.is_empty() && !hash.starts_with(&self.work_c) {
            return Err(ProtocolError::new(ErrCode::MintPoWInvalidHash, "invalid workc"));
        }

        Ok(())
    }

    /// Whether `want` more can be minted by a wallet that already minted
    /// `minted`.
    pub fn can_mint(&self, want: &Decimal, minted: &Decimal) -> Result<(), ProtocolError> {
        if want > &self.limit {
            return Err(ProtocolError::new(
                ErrCode::MintAmountExceedLimit,
                format!("invalid amount. {want} > limit")
            ));
        }

        let wallet_remain = &self.wallet_limit - minted;
        if want > &wallet_remain {
            return Err(ProtocolError::new(
                ErrCode::MintAmountExceedLimit,
                format!("invalid amount. {want} > wallet_remain({wallet_remain})")
            ));
        }

        let remain = &self.max_supply - &self.supply;
        if want > &remain {
            return Err(ProtocolError::new(
                ErrCode::MintAmountExceedLimit,
                format!("invalid amount. {want} > remain_supply({remain})")
            ));
        }

        Ok(())
    }

    pub fn mint(&mut self, block_number: u64, amount: &Decimal) {
        self.supply = &self.supply + amount;
        self.last_updated_block = block_number;
    }
}

#[cfg(test)]
mod tests {
    use ierc_types::{CommandBase, Operate, protocol::ZERO_ADDRESS};

    use super::*;

    fn deploy(tick: &str, max: &str, limit: &str, wallet_limit: &str, work_c: &str) -> DeployCommand {
        DeployCommand {
            base:             CommandBase {
                block_number:      100,
                tx_hash:           "0x00ff".to_string(),
                tx_value:          Decimal::zero(),
                position_in_block: 0,
                from:              "0xc0ffee".to_string(),
                to:                ZERO_ADDRESS.to_string(),
                gas:               Decimal::zero(),
                gas_price:         Decimal::zero(),
                event_at:          0,
                protocol:          Protocol::Ierc20,
                operate:           Operate::Deploy
            },
            tick:             tick.to_string(),
            max_supply:       dec(max),
            decimals:         18,
            limit_per_tx:     dec(limit),
            limit_per_wallet: dec(wallet_limit),
            work_c:           work_c.to_string(),
            nonce:            "1".to_string()
        }
    }

    #[test]
    fn deploy_snapshot() {
        let tick = Ierc20Tick::from_deploy(&deploy("abcd", "100", "10", "20", "0x0000"));
        assert_eq!(tick.tick, "abcd");
        assert_eq!(tick.max_supply, dec("100"));
        assert_eq!(tick.supply, dec("0"));
        assert_eq!(tick.creator, "0xc0ffee");
        assert_eq!(tick.last_updated_block, 100);
    }

    #[test]
    fn known_ticks_keep_their_shipped_max_supply() {
        let m4 = Ierc20Tick::from_deploy(&deploy("ierc-m4", "1000000000", "1", "1", ""));
        assert_eq!(m4.max_supply, dec("21016000"));

        let m5 = Ierc20Tick::from_deploy(&deploy("ierc-m5", "1", "1", "1", ""));
        assert_eq!(m5.max_supply, dec("24874936"));
    }

    #[test]
    fn hash_must_carry_work_prefix() {
        let tick = Ierc20Tick::from_deploy(&deploy("abcd", "100", "10", "20", "0x0000"));
        assert!(tick.validate_hash("0x0000abcd").is_ok());

        let err = tick.validate_hash("0x1234").unwrap_err();
        assert_eq!(err.code(), ErrCode::MintPoWInvalidHash);

        let no_work = Ierc20Tick::from_deploy(&deploy("abcd", "100", "10", "20", ""));
        assert!(no_work.validate_hash("0x1234").is_ok());
    }

    #[test]
    fn mint_caps_apply_in_order() {
        let mut tick = Ierc20Tick::from_deploy(&deploy("abcd", "100", "10", "20", ""));

        // per-tx limit
        assert_eq!(
            tick.can_mint(&dec("11"), &dec("0")).unwrap_err().code(),
            ErrCode::MintAmountExceedLimit
        );

        // wallet cap: already minted 20 of 20
        assert_eq!(
            tick.can_mint(&dec("10"), &dec("20")).unwrap_err().code(),
            ErrCode::MintAmountExceedLimit
        );

        // remaining supply
        tick.supply = dec("95");
        assert_eq!(
            tick.can_mint(&dec("10"), &dec("0")).unwrap_err().code(),
            ErrCode::MintAmountExceedLimit
        );

        tick.supply = dec("90");
        assert!(tick.can_mint(&dec("10"), &dec("0")).is_ok());

        tick.mint(101, &dec("10"));
        assert_eq!(tick.supply, dec("100"));
        assert_eq!(tick.last_updated_block, 101);
    }
}
