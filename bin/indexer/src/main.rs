use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use ierc_eth::{BlockFetcher, RpcBlockFetcher};
use ierc_interpreter::{BlockService, IndexerConfig, IndexerService};
use ierc_protocol::ProtocolParser;
use ierc_rpc::{IndexerApi, IndexerApiServer};
use ierc_storage::{
    cache::{BalanceCache, StakingCache, TickCache},
    memory::MemoryIndexDb,
    BlockRepository, EventRepository
};
use jsonrpsee::server::ServerBuilder;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod config;

use config::Config;

#[derive(Parser)]
#[clap(about = "Inscription protocol indexer")]
struct Cli {
    /// path to the TOML configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: PathBuf
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    info!(path = %cli.config.display(), "load config file");
    let config = Config::load(&cli.config)?;
    let invalid_tx_hashes = Arc::new(config.load_invalid_tx_hashes()?);

    let parser = ProtocolParser::new();
    let db = MemoryIndexDb::new(parser.clone());

    let endpoints = config
        .chain
        .endpoints
        .iter()
        .map(|e| e.parse())
        .collect::<Result<Vec<_>, _>>()?;
    let fetcher = Arc::new(RpcBlockFetcher::new(endpoints, parser)?);

    let block_repo: Arc<dyn BlockRepository> = Arc::new(db.clone());
    let event_repo: Arc<dyn EventRepository> = Arc::new(db.clone());

    let ticks = Arc::new(TickCache::new(Arc::new(db.clone())));
    let balances = Arc::new(BalanceCache::new(Arc::new(db.clone())));
    let pools = Arc::new(StakingCache::init(Arc::new(db.clone())).await?);

    let handler = BlockService::new(
        event_repo.clone(),
        ticks,
        balances,
        pools,
        Arc::new(db.clone()),
        invalid_tx_hashes,
        config.runtime.fee_start_block
    )
    .await?;

    let cancel = CancellationToken::new();
    let service = IndexerService::new(
        fetcher.clone(),
        block_repo.clone(),
        handler,
        IndexerConfig {
            enable_sync:       config.runtime.enable_sync,
            sync_start_block:  config.runtime.sync_start_block,
            sync_threads_num:  config.runtime.sync_threads_num,
            enable_handle:     config.runtime.enable_handle,
            handle_end_block:  config.runtime.handle_end_block,
            handle_queue_size: config.runtime.handle_queue_size
        },
        cancel.clone()
    );

    let api_fetcher: Arc<dyn BlockFetcher> = fetcher;
    let api = IndexerApi::new(event_repo, block_repo, api_fetcher);
    let server = ServerBuilder::default()
        .build(&config.server.rpc_addr)
        .await?;
    info!(addr = %server.local_addr()?, "rpc server started");
    let server_handle = server.start(api.into_rpc());

    // one shutdown signal for everything; each loop finishes its block
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            cancel.cancel();
        }
    });

    let result = service.run().await;

    server_handle.stop()?;
    server_handle.stopped().await;

    Ok(result?)
}
