//! Shared vocabulary of the inscription indexer: exact decimals, protocol
//! constants, error codes, typed commands, blocks and domain events.

pub mod block;
pub mod commands;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod protocol;

pub use block::{Block, BlockHandleStatus, BlockHeader, Transaction};
pub use commands::{Command, CommandBase};
pub use decimal::{dec, Decimal, DecimalExt};
pub use errors::{ErrCode, ProtocolError};
pub use events::{Event, EventKind, EventsByBlock};
pub use protocol::{Operate, Protocol};
