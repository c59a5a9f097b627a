//! `tunevisor` binary.
//!
//! Configuration: optional TOML file at `$TUNEVISOR_CONFIG`, overridden by
//! environment variables (`BOT_TOKEN`, `OWNER_CHAT_ID`,
//! `YANDEX_MUSIC_AUTH_TOKEN`, ...). Logging: `RUST_LOG`, default `tunevisor=info`.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tunevisor::app::{App, Collaborators};
use tunevisor::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tunevisor=info")),
        )
        .init();

    let cfg = Config::load().context("loading configuration")?;
    let parts = Collaborators::production(&cfg).context("building clients")?;
    tracing::info!(
        owner = cfg.owner_chat_id,
        log_chat = cfg.log_chat(),
        downloads = %cfg.download_dir.display(),
        "starting"
    );

    let shutdown = async {
        if let Err(e) = tunevisor::wait_for_shutdown_signal().await {
            tracing::error!(error = %e, "signal handlers unavailable, shutting down");
        }
    };
    App::new(&cfg, parts)
        .run(shutdown)
        .await
        .context("session could not be established")?;

    tracing::info!("bye");
    Ok(())
}
