//! Token ticks: the legacy mint-limited variant and the PoW-scheduled one.

mod ierc20;
mod pow;

pub use ierc20::Ierc20Tick;
pub use pow::{count_leading_hex_zeros, PowMintParams, PowTick};

use ierc_types::Protocol;

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Ierc20(Ierc20Tick),
    Pow(PowTick)
}

impl Tick {
    pub fn name(&self) -> &str {
        match self {
            Tick::Ierc20(t) => &t.tick,
            Tick::Pow(t) => &t.tick
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Tick::Ierc20(t) => t.protocol,
            Tick::Pow(t) => t.protocol
        }
    }

    pub fn last_updated_block(&self) -> u64 {
        match self {
            Tick::Ierc20(t) => t.last_updated_block,
            Tick::Pow(t) => t.last_updated_block()
        }
    }
}
