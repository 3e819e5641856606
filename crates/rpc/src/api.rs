//! Wire types and the RPC trait.

use ierc_types::{Event, EventsByBlock};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use serde::{Deserialize, Serialize};

/// One block's worth of events pushed to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeReply {
    pub block_number:      u64,
    pub prev_block_number: u64,
    pub events:            Vec<Event>
}

impl From<EventsByBlock> for SubscribeReply {
    fn from(group: EventsByBlock) -> Self {
        Self {
            block_number:      group.block_number,
            prev_block_number: group.prev_block_number(),
            events:            group.events
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemStatus {
    pub latest_chain_block:   u64,
    pub last_processed_block: u64
}

#[rpc(server, namespace = "ierc")]
pub trait IndexerApi {
    /// Chain head vs. the newest fully processed block.
    #[method(name = "systemStatus")]
    async fn system_status(&self) -> RpcResult<SystemStatus>;

    /// Every event a transaction produced, in emission order.
    #[method(name = "eventsByTxHash")]
    async fn events_by_tx_hash(&self, tx_hash: String) -> RpcResult<Vec<Event>>;

    /// Persisted events grouped per block, starting after `start_block`.
    #[method(name = "eventsByBlocks")]
    async fn events_by_blocks(
        &self,
        start_block: u64,
        limit: usize
    ) -> RpcResult<Vec<SubscribeReply>>;

    /// Replays persisted events from `start_block`, then streams live ones.
    #[subscription(name = "subscribeEvents", item = SubscribeReply)]
    async fn subscribe_events(&self, start_block: u64) -> jsonrpsee::core::SubscriptionResult;

    /// Periodic status pushes.
    #[subscription(name = "subscribeSystemStatus", item = SystemStatus)]
    async fn subscribe_system_status(&self) -> jsonrpsee::core::SubscriptionResult;
}
