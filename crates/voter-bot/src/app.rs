//! Main application orchestration.
//!
//! Wires the pipeline together in dependency order: chain resolution
//! first (fatal on failure), then feeds and providers, whitelisting,
//! and finally the scheduler, action worker and confirmation listener.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use voter_chain::{
    ActionQueue, ChainRpc, ConfirmationListener, FinalizeConfig, ListenerConfig, RpcClient,
    TxSender, WhitelistGuard,
};
use voter_core::RecordStore;
use voter_feed::{
    build_aggregator, build_provider, FeedRegistry, PullSource, RestClient,
};
use voter_registry::resolve_chain;
use voter_scheduler::{
    AssetPipeline, SchedulerConfig, SubmissionScheduler, SystemClock,
};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Resolve, wire and run until shutdown.
    pub async fn run(self) -> AppResult<()> {
        let config = &self.config;
        let rpc: Arc<RpcClient> = Arc::new(RpcClient::new(&config.chain.rpc_url)?);

        // Everything downstream depends on resolution; abort on failure.
        let resolution = resolve_chain(
            rpc.as_ref(),
            config.oracle_manager()?,
            &config.symbols(),
        )
        .await?;
        info!(
            chain_id = resolution.chain_id,
            submitter = %resolution.submitter,
            "startup resolution done"
        );

        let sender = Arc::new(TxSender::new(
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            config.account_key()?,
            resolution.chain_id,
            config.chain.gas_price_wei,
            config.chain.sequence_refresh_every,
            FinalizeConfig {
                base_delay_ms: config.chain.finalize.base_delay_ms,
                multiplier: config.chain.finalize.multiplier,
                max_retries: config.chain.finalize.max_retries,
            },
        )?);
        info!(voter = %sender.address(), "signer ready");

        let whitelist = Arc::new(WhitelistGuard::new(
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            resolution.submitter,
            sender.address(),
            config.chain.trusted,
            PathBuf::from(&config.chain.whitelist_marker),
        ));
        let configured_indices: Vec<u32> = config
            .symbols()
            .iter()
            .filter_map(|s| resolution.registry.index_of(s))
            .collect();
        whitelist
            .ensure_whitelisted(&sender, &configured_indices, config.chain.whitelist_gas_limit)
            .await?;

        // Feeds: one shared registry so assets reuse venue connections.
        let feeds = Arc::new(FeedRegistry::new(config.feed.clone()));
        let pull: Arc<dyn PullSource> = Arc::new(RestClient::new()?);

        let reference = match &config.reference {
            Some(r) => {
                let aggregator = build_aggregator(&r.symbol, &r.provider, &feeds, Arc::clone(&pull))?;
                Some((aggregator, r.conversion))
            }
            None => None,
        };

        let mut assets = Vec::with_capacity(config.assets.len());
        for asset in &config.assets {
            let provider = build_provider(
                &asset.symbol,
                &asset.provider,
                &feeds,
                Arc::clone(&pull),
                reference.clone(),
            )?;
            assets.push(AssetPipeline {
                symbol: asset.symbol.clone(),
                provider,
                decimals: asset.decimals,
            });
        }
        info!(assets = assets.len(), "price providers built");

        let records = Arc::new(RecordStore::new());
        let shutdown = CancellationToken::new();

        let (queue, worker) = ActionQueue::new();
        tokio::spawn(worker.run(shutdown.clone()));

        let listener = ConfirmationListener::new(
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            resolution.submitter,
            sender.address(),
            resolution.registry.index_map(),
            Arc::clone(&records),
            ListenerConfig {
                poll_interval_ms: config.chain.listener_poll_ms,
            },
        );
        tokio::spawn(listener.run(shutdown.clone()));

        let scheduler = Arc::new(SubmissionScheduler::new(
            Arc::new(SystemClock),
            resolution.settings,
            assets,
            Arc::clone(&resolution.registry),
            records,
            queue,
            sender,
            whitelist,
            resolution.submitter,
            SchedulerConfig {
                submit_offset_ms: config.scheduling.submit_offset_ms,
                reveal_offset_ms: config.scheduling.reveal_offset_ms,
                commit_gas_limit: config.chain.commit_gas_limit,
                reveal_gas_limit: config.chain.reveal_gas_limit,
                binding: config.scheduling.binding,
            },
        ));

        let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
            result = scheduler_task => {
                if let Err(e) = result {
                    error!(error = %e, "scheduler task ended unexpectedly");
                    shutdown.cancel();
                    feeds.shutdown();
                    return Err(AppError::Config("scheduler task panicked".to_string()));
                }
            }
        }

        shutdown.cancel();
        feeds.shutdown();
        info!("voter stopped");
        Ok(())
    }
}
