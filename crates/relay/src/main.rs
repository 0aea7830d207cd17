use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use relay_core::{config::Config, store::KvStore};
use relay_redis::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn KvStore> = Arc::new(
        RedisStore::connect(&cfg)
            .await
            .context("redis is required to start")?,
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        signal.cancel();
    });

    relay_telegram::router::run_polling(cfg, store, shutdown)
        .await
        .context("telegram bot failed")?;

    Ok(())
}
