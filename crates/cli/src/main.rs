use anyhow::Result;
use clap::{Parser, Subcommand};
use polyarb_arbitrage::Engine;
use polyarb_core::ConfigLoader;
use polyarb_polymarket::{discovery, VenueClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyarb")]
#[command(about = "Prediction-market arbitrage system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Run a discovery scan and print the ranked candidates
    Discover {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Show only the top N candidates
        #[arg(short, long, default_value_t = 20)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = ConfigLoader::load_from(&config)?;
            let engine = Engine::start(config).await?;
            engine.run().await
        }
        Commands::Discover { config, top } => {
            let config = ConfigLoader::load_from(&config)?;
            let client = VenueClient::new(config.feeds.catalog_url, config.feeds.clob_url);
            let ranked = discovery::scan(&client, &config.discovery).await;
            info!(candidates = ranked.len(), "Discovery complete");
            for (i, scored) in ranked.iter().take(top).enumerate() {
                println!(
                    "{:>3}. [{:>6.2}] {}  (liq {:?}, vol {:?})",
                    i + 1,
                    scored.score,
                    scored.market.question,
                    scored.market.liquidity,
                    scored.market.volume,
                );
            }
            Ok(())
        }
    }
}
