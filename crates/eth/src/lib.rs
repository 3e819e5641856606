//! Chain-node access: fetching blocks and headers over JSON-RPC.

mod fetcher;

pub use fetcher::{BlockFetcher, FetchError, RpcBlockFetcher};
