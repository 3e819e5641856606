//! Subscription façade: replayable event streams and system status over
//! JSON-RPC.

pub mod api;
mod impls;

pub use api::{IndexerApiServer, SubscribeReply, SystemStatus};
pub use impls::IndexerApi;
