//! RPC handler implementation.

use std::{sync::Arc, time::Duration};

use ierc_eth::BlockFetcher;
use ierc_storage::{BlockRepository, EventRepository};
use ierc_types::Event;
use jsonrpsee::{
    core::{RpcResult, SubscriptionResult},
    types::{error::INTERNAL_ERROR_CODE, ErrorObjectOwned},
    PendingSubscriptionSink, SubscriptionMessage
};
use tracing::{debug, error};

use crate::api::{IndexerApiServer, SubscribeReply, SystemStatus};

const STATUS_PUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct IndexerApi {
    events:  Arc<dyn EventRepository>,
    blocks:  Arc<dyn BlockRepository>,
    fetcher: Arc<dyn BlockFetcher>
}

impl IndexerApi {
    pub fn new(
        events: Arc<dyn EventRepository>,
        blocks: Arc<dyn BlockRepository>,
        fetcher: Arc<dyn BlockFetcher>
    ) -> Self {
        Self { events, blocks, fetcher }
    }

    async fn current_status(&self, after: u64) -> RpcResult<SystemStatus> {
        let latest = self
            .fetcher
            .header_by_number(0)
            .await
            .map_err(internal_err)?;

        let processed = self
            .blocks
            .next_retriable_header(after)
            .await
            .map_err(internal_err)?;

        Ok(SystemStatus {
            latest_chain_block:   latest.number,
            last_processed_block: processed.map(|h| h.number).unwrap_or(after)
        })
    }
}

#[async_trait::async_trait]
impl IndexerApiServer for IndexerApi {
    async fn system_status(&self) -> RpcResult<SystemStatus> {
        self.current_status(0).await
    }

    async fn events_by_tx_hash(&self, tx_hash: String) -> RpcResult<Vec<Event>> {
        self.events
            .events_by_hash(&tx_hash)
            .await
            .map_err(internal_err)
    }

    async fn events_by_blocks(
        &self,
        start_block: u64,
        limit: usize
    ) -> RpcResult<Vec<SubscribeReply>> {
        let groups = self
            .events
            .events_by_blocks(start_block, limit)
            .await
            .map_err(internal_err)?;

        Ok(groups.into_iter().map(SubscribeReply::from).collect())
    }

    async fn subscribe_events(
        &self,
        pending: PendingSubscriptionSink,
        start_block: u64
    ) -> SubscriptionResult {
        let sink = pending.accept().await?;
        let mut subscription = self
            .events
            .subscribe(start_block)
            .await
            .map_err(|err| err.to_string())?;

        tokio::spawn(async move {
            // the repository replays history first, then feeds live blocks
            let mut last_block = start_block;
            while let Some(group) = subscription.next().await {
                if sink.is_closed() {
                    break;
                }

                if group.block_number < last_block {
                    continue;
                }
                last_block = group.block_number;

                let reply = SubscribeReply::from(group);
                match SubscriptionMessage::from_json(&reply) {
                    Ok(message) => {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        error!(%err, "failed to serialize subscription message");
                    }
                }
            }

            debug!(subscriber = subscription.id(), "event subscription closed");
        });

        Ok(())
    }

    async fn subscribe_system_status(&self, pending: PendingSubscriptionSink) -> SubscriptionResult {
        let sink = pending.accept().await?;

        let events = self.events.clone();
        let blocks = self.blocks.clone();
        let fetcher = self.fetcher.clone();

        tokio::spawn(async move {
            let api = IndexerApi { events, blocks, fetcher };
            let mut interval = tokio::time::interval(STATUS_PUSH_INTERVAL);
            let mut cursor = 0u64;

            loop {
                interval.tick().await;
                if sink.is_closed() {
                    break;
                }

                let status = match api.current_status(cursor).await {
                    Ok(status) => status,
                    Err(err) => {
                        error!(%err, "status query failed");
                        break;
                    }
                };
                cursor = status.last_processed_block;

                let Ok(message) = SubscriptionMessage::from_json(&status) else { continue };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        Ok(())
    }
}

fn internal_err(err: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INTERNAL_ERROR_CODE, err.to_string(), None::<()>)
}
