use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use twitch_vod::{DockerCli, ManifestSource, MetadataResolver, RecoveryDriver, client};

use vodrec::api::{ApiServer, ApiServerConfig, AppState};
use vodrec::cache::VodCache;
use vodrec::config::AppConfig;
use vodrec::logging;
use vodrec::resolver::VodService;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How often expired cache entries are swept.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default().context("invalid configuration")?;
    let log_guard = logging::init_logging(config.log_dir.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        strategy = %config.strategy,
        "Starting vodrec"
    );

    let cancel = CancellationToken::new();
    log_guard.start_retention_cleanup(cancel.clone());

    let http_client = client::default_client().context("failed to build HTTP client")?;

    let mut sources: Vec<Arc<dyn ManifestSource>> = Vec::new();
    if config.strategy.uses_metadata() {
        sources.push(Arc::new(MetadataResolver::new(
            http_client.clone(),
            config.metadata.clone(),
        )));
    }
    if config.strategy.uses_recovery() {
        let runtime = Arc::new(
            DockerCli::new(config.docker_path.clone())
                .with_stop_timeout(config.docker_stop_timeout_secs),
        );
        sources.push(Arc::new(RecoveryDriver::new(runtime, config.recovery.clone())));
    }

    let cache = Arc::new(VodCache::load(&config.cache).await);
    info!(entries = cache.len(), "Cache ready");
    spawn_cache_sweeper(cache.clone(), cancel.clone());

    let service = Arc::new(VodService::new(cache.clone(), config.strategy, sources)?);
    let state = AppState::new(service, http_client)
        .with_proxy(config.proxy.clone())
        .with_public_dir(config.public_dir.clone());

    let server = ApiServer::new(ApiServerConfig::from_env_or_default(), state);
    let server_token = server.cancel_token();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
            cancel.cancel();
            server_token.cancel();
        });
    }

    let served = server.run().await;
    cancel.cancel();

    if let Err(e) = cache.flush().await {
        warn!(error = %e, "Failed to flush cache on shutdown");
    }
    info!("vodrec stopped");

    served?;
    Ok(())
}

fn spawn_cache_sweeper(cache: Arc<VodCache>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = cache.cleanup_expired();
                    if removed > 0 {
                        debug!(removed, "Swept expired cache entries");
                    }
                }
            }
        }
    });
}
