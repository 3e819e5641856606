//! Domain state the interpreter replays commands against: token ticks,
//! per-address balances and staking pools.

pub mod balance;
pub mod staking;
pub mod tick;

pub use balance::{Balance, BalanceKey};
pub use staking::{PoolAggregate, StakingPool, StakingPosition};
pub use tick::{Ierc20Tick, PowMintParams, PowTick, Tick};
