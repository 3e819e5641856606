//! Wire-format concerns: decoding inscription calldata into typed commands
//! and verifying the off-chain approval signatures they reference.

pub mod parser;
pub mod signature;

pub use parser::ProtocolParser;
pub use signature::Approval;
