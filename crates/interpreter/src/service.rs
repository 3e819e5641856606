//! Supervisor of the three cooperative loops: sync blocks from the chain,
//! load pending blocks from persistence, and handle them serially.

use std::{sync::Arc, time::Duration};

use futures::{stream, StreamExt, TryStreamExt};
use ierc_eth::BlockFetcher;
use ierc_storage::BlockRepository;
use ierc_types::{Block, BlockHandleStatus};
use ierc_utils::retry_with_count;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{BlockService, ServiceError};

const SYNC_RETRY_COUNT: u32 = 5;
const SYNC_RETRY_PAUSE: Duration = Duration::from_secs(15);
const SYNC_RETRY_RESET_WINDOW: Duration = Duration::from_secs(180);

/// How many in-flight block fetches one sync batch may hold.
const FETCH_CONCURRENCY: usize = 1000;

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const LOAD_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub enable_sync:       bool,
    pub sync_start_block:  u64,
    pub sync_threads_num:  u64,
    pub enable_handle:     bool,
    pub handle_end_block:  u64,
    pub handle_queue_size: usize
}

pub struct IndexerService<F> {
    fetcher: Arc<F>,
    blocks:  Arc<dyn BlockRepository>,
    handler: BlockService,
    config:  IndexerConfig,
    status:  Arc<RwLock<BlockHandleStatus>>,
    cancel:  CancellationToken
}

impl<F: BlockFetcher + 'static> IndexerService<F> {
    pub fn new(
        fetcher: Arc<F>,
        blocks: Arc<dyn BlockRepository>,
        handler: BlockService,
        config: IndexerConfig,
        cancel: CancellationToken
    ) -> Self {
        Self {
            fetcher,
            blocks,
            handler,
            config,
            status: Arc::new(RwLock::new(BlockHandleStatus::default())),
            cancel
        }
    }

    pub fn status(&self) -> Arc<RwLock<BlockHandleStatus>> {
        self.status.clone()
    }

    /// Runs every enabled loop until cancellation or a fatal error. Each
    /// loop finishes its in-flight block before exiting.
    pub async fn run(mut self) -> Result<(), ServiceError> {
        info!("start indexer service");

        self.init_status().await?;

        let (queue_tx, queue_rx) =
            mpsc::channel::<Block>(self.config.handle_queue_size.max(1));

        let sync = {
            let fetcher = self.fetcher.clone();
            let blocks = self.blocks.clone();
            let status = self.status.clone();
            let cancel = self.cancel.clone();
            let config = self.config.clone();

            async move {
                if !config.enable_sync {
                    return Ok(());
                }

                retry_with_count(
                    SYNC_RETRY_COUNT,
                    SYNC_RETRY_PAUSE,
                    SYNC_RETRY_RESET_WINDOW,
                    &cancel,
                    || {
                        sync_loop(
                            fetcher.as_ref(),
                            blocks.as_ref(),
                            &status,
                            config.sync_threads_num.max(1),
                            &cancel
                        )
                    }
                )
                .await
            }
        };

        let load = {
            let blocks = self.blocks.clone();
            let status = self.status.clone();
            let cancel = self.cancel.clone();
            let enabled = self.config.enable_handle;

            async move {
                if !enabled {
                    return Ok(());
                }

                load_loop(blocks.as_ref(), &status, queue_tx, &cancel).await
            }
        };

        let handle = {
            let status = self.status.clone();
            let cancel = self.cancel.clone();
            let end_block = self.config.handle_end_block;
            let enabled = self.config.enable_handle;
            let handler = &mut self.handler;

            async move {
                if !enabled {
                    return Ok(());
                }

                handle_loop(handler, queue_rx, &status, end_block, &cancel).await
            }
        };

        let result = tokio::try_join!(sync, load, handle).map(|_| ());
        info!("quit indexer service");
        result
    }

    async fn init_status(&mut self) -> Result<(), ServiceError> {
        let latest = self.fetcher.header_by_number(0).await?;

        let last_indexed = match self.blocks.last_indexed_header().await? {
            Some(header) => header,
            None => self.fetcher.header_by_number(self.config.sync_start_block).await?
        };

        let last_sync = self.blocks.last_handled_header().await?;

        let mut status = self.status.write();
        status.latest_block = Some(latest);
        status.last_indexed_block = Some(last_indexed);
        status.last_sync_block = last_sync;

        Ok(())
    }
}

/// Fetches batches of blocks, verifies parent-hash chaining and bulk-writes
/// them. Returns `Ok` only on cancellation; errors bubble to the retry
/// harness.
async fn sync_loop<F: BlockFetcher>(
    fetcher: &F,
    blocks: &dyn BlockRepository,
    status: &RwLock<BlockHandleStatus>,
    batch_size: u64,
    cancel: &CancellationToken
) -> Result<(), ServiceError> {
    info!("start sync block loop");

    loop {
        if cancel.is_cancelled() {
            info!("quit sync block loop");
            return Ok(());
        }

        let (latest, last_indexed) = {
            let status = status.read();
            (
                status.latest_block.clone().expect("status initialized"),
                status.last_indexed_block.clone().expect("status initialized")
            )
        };

        if last_indexed.number + 1 < latest.number {
            let start = last_indexed.number + 1;
            let end = latest.number.min(start + batch_size);
            info!(start_height = start, end_height = end, "fetch blocks");

            let mut batch: Vec<Block> = stream::iter(start..end)
                .map(|number| fetcher.block_by_number(number))
                .buffer_unordered(FETCH_CONCURRENCY)
                .try_collect()
                .await?;
            batch.sort_by_key(|block| block.number);

            if batch.is_empty() {
                continue;
            }

            let mut previous = last_indexed.clone();
            for block in &batch {
                if block.parent_hash != previous.hash {
                    error!(
                        block_number = block.number,
                        expected_parent = %previous.hash,
                        actual_parent = %block.parent_hash,
                        "indexed chain diverged"
                    );
                    return Err(ServiceError::BlockRollback(block.number));
                }

                previous = block.header();
            }

            blocks.save_blocks(batch).await?;
            status.write().last_indexed_block = Some(previous);
        } else {
            let head = fetcher.header_by_number(0).await?;

            if head.number < latest.number {
                return Err(ServiceError::BlockRollback(head.number));
            }

            if head.number == latest.number {
                info!("no new block, sleeping");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("quit sync block loop");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }
            } else {
                info!(latest_block = head.number, "new chain head");
                status.write().latest_block = Some(head);
            }
        }
    }
}

/// Feeds pending blocks (with protocol transactions, not yet processed) into
/// the bounded handle queue in ascending order.
async fn load_loop(
    blocks: &dyn BlockRepository,
    status: &RwLock<BlockHandleStatus>,
    queue: mpsc::Sender<Block>,
    cancel: &CancellationToken
) -> Result<(), ServiceError> {
    info!("start block load loop");

    let mut last_loaded = status
        .read()
        .last_sync_block
        .as_ref()
        .map(|header| header.number)
        .unwrap_or(0);

    loop {
        if cancel.is_cancelled() {
            info!("stop block load loop");
            return Ok(());
        }

        let pending = blocks.pending_blocks(last_loaded, LOAD_BATCH_SIZE).await?;

        if pending.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stop block load loop");
                    return Ok(());
                }
                _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
            }
        }

        for block in pending {
            last_loaded = block.number;
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stop block load loop");
                    return Ok(());
                }
                sent = queue.send(block) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Drains the handle queue strictly serially so block processing stays
/// deterministic.
async fn handle_loop(
    handler: &mut BlockService,
    mut queue: mpsc::Receiver<Block>,
    status: &RwLock<BlockHandleStatus>,
    end_block: u64,
    cancel: &CancellationToken
) -> Result<(), ServiceError> {
    info!("start block handle loop");

    loop {
        let block = tokio::select! {
            _ = cancel.cancelled() => {
                info!("stop block handle loop");
                return Ok(());
            }
            block = queue.recv() => match block {
                Some(block) => block,
                None => return Ok(())
            }
        };

        if end_block != 0 && block.number > end_block {
            info!(current_block = block.number, end_block, "block handle done");
            return Ok(());
        }

        let header = block.header();
        handler.handle_block(block).await?;
        status.write().last_sync_block = Some(header);
    }
}
