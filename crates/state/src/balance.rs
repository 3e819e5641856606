//! Per-`(address, tick)` holdings.

use ierc_types::Decimal;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub address: String,
    pub tick:    String
}

impl BalanceKey {
    pub fn new(address: impl Into<String>, tick: impl Into<String>) -> Self {
        Self { address: address.into(), tick: tick.into() }
    }
}

/// A holder's position in one tick. `available + freeze` is the holder's
/// total; `minted_amount` only ever grows and backs the per-wallet mint cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub address:            String,
    pub tick:               String,
    pub available:          Decimal,
    pub freeze:             Decimal,
    pub minted_amount:      Decimal,
    pub last_updated_block: u64
}

impl Balance {
    pub fn new(address: impl Into<String>, tick: impl Into<String>) -> Self {
        Self {
            address:            address.into(),
            tick:               tick.into(),
            available:          Decimal::zero(),
            freeze:             Decimal::zero(),
            minted_amount:      Decimal::zero(),
            last_updated_block: 0
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.address.clone(), self.tick.clone())
    }

    pub fn total(&self) -> Decimal {
        &self.available + &self.freeze
    }

    pub fn add_available(&mut self, block_number: u64, amount: &Decimal) {
        self.available = &self.available + amount;
        self.last_updated_block = block_number;
    }

    pub fn sub_available(&mut self, block_number: u64, amount: &Decimal) {
        self.available = &self.available - amount;
        self.last_updated_block = block_number;
    }

    pub fn add_freeze(&mut self, block_number: u64, amount: &Decimal) {
        self.freeze = &self.freeze + amount;
        self.last_updated_block = block_number;
    }

    pub fn sub_freeze(&mut self, block_number: u64, amount: &Decimal) {
        self.freeze = &self.freeze - amount;
        self.last_updated_block = block_number;
    }

    /// Credits freshly minted supply.
    pub fn add_mint(&mut self, block_number: u64, amount: &Decimal) {
        self.available = &self.available + amount;
        self.minted_amount = &self.minted_amount + amount;
        self.last_updated_block = block_number;
    }

    /// Moves available funds into the frozen bucket.
    pub fn freeze_balance(&mut self, block_number: u64, amount: &Decimal) {
        self.available = &self.available - amount;
        self.freeze = &self.freeze + amount;
        self.last_updated_block = block_number;
    }

    /// Releases frozen funds back to available.
    pub fn unfreeze_balance(&mut self, block_number: u64, amount: &Decimal) {
        self.available = &self.available + amount;
        self.freeze = &self.freeze - amount;
        self.last_updated_block = block_number;
    }
}

#[cfg(test)]
mod tests {
    use ierc_types::dec;

    use super::*;

    #[test]
    fn mint_tracks_minted_amount() {
        let mut balance = Balance::new("0x01", "abcd");
        balance.add_mint(10, &dec("100"));
        balance.add_mint(11, &dec("50"));

        assert_eq!(balance.available, dec("150"));
        assert_eq!(balance.minted_amount, dec("150"));
        assert_eq!(balance.last_updated_block, 11);
    }

    #[test]
    fn freeze_round_trip_preserves_total() {
        let mut balance = Balance::new("0x01", "abcd");
        balance.add_available(1, &dec("100"));

        balance.freeze_balance(2, &dec("30"));
        assert_eq!(balance.available, dec("70"));
        assert_eq!(balance.freeze, dec("30"));
        assert_eq!(balance.total(), dec("100"));

        balance.unfreeze_balance(3, &dec("30"));
        assert_eq!(balance.available, dec("100"));
        assert_eq!(balance.freeze, dec("0"));
    }
}
