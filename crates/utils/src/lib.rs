//! Small shared helpers with no domain knowledge.

pub mod hex;
pub mod retry;

pub use hex::{is_hex_address, parse_hex_u64};
pub use retry::retry_with_count;
