//! The deterministic protocol interpreter: per-block command dispatch, warm
//! state loading, transactional persistence and the supervisor loops that
//! feed it.

pub mod aggregate;
pub mod block_service;
pub mod service;

pub use aggregate::BlockAggregate;
pub use block_service::BlockService;
pub use service::{IndexerConfig, IndexerService};

use ierc_eth::FetchError;
use ierc_storage::StorageError;
use thiserror::Error;

/// Failures that abort a block and make it retriable. Protocol errors never
/// show up here; they are recorded on events instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("indexed chain diverged from the node at block {0}")]
    BlockRollback(u64)
}
