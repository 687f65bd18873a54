use clap::Parser;
use momentum_radar::cli::{Cli, Commands};
use momentum_radar::config::Config;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing file means defaults; a broken one is an error
    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Config file {} not found, using defaults", cli.config);
        Config::default()
    };

    let _telemetry = momentum_radar::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting momentum-radar");
            args.execute(config).await?;
        }
        Commands::Score(args) => {
            args.execute(config).await?;
        }
        Commands::Backtest(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
