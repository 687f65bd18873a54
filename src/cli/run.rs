//! Run command implementation

use crate::app::App;
use crate::config::{Config, SourceMode};
use clap::Args;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the broadcast bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// Use synthetic market data regardless of configuration
    #[arg(long)]
    pub synthetic: bool,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(ref bind) = self.bind {
            config.broadcast.bind_addr = bind.clone();
        }
        if self.synthetic {
            config.source.mode = SourceMode::Synthetic;
        }

        let app = App::build(config)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = app.start(shutdown_rx).await?;

        tracing::info!(
            bind = %app.config.broadcast.bind_addr,
            "momentum-radar running, press Ctrl-C to stop"
        );
        tokio::signal::ctrl_c().await?;

        tracing::info!("Shutting down");
        shutdown_tx.send(true)?;
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Task ended abnormally");
            }
        }
        Ok(())
    }
}
