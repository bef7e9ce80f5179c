use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use courier::channels::telegram::TelegramChannel;
use courier::config::{load_dotenv, Config};
use courier::lifecycle::{shutdown_signal, Relay};

#[derive(Parser)]
#[command(name = "courier", version, about = "Telegram relay bot with an HTTP control API")]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a dotenv file loaded before reading the environment
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let dotenv = load_dotenv(&cli.env_file);
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(config.debug)?;

    match dotenv {
        Ok(0) => {}
        Ok(n) => info!("Loaded {n} variable(s) from {}", cli.env_file.display()),
        Err(e) => warn!("Could not load {}: {e}", cli.env_file.display()),
    }
    if let Some(url) = &config.telegram.webhook_url {
        warn!("WEBHOOK_URL is set ({url}) but the relay runs in polling mode; ignoring it");
    }

    let channel = TelegramChannel::new(&config.telegram)?;
    let username = channel.authorize().await?;
    info!("Authorized on account @{username}");

    let relay = Relay::bind(&config, Arc::new(channel.messenger())).await?;
    relay.run(channel.updates(), shutdown_signal()).await?;

    info!("Courier stopped");
    Ok(())
}

fn init_tracing(debug: bool) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            "info,courier=debug,tower_http=debug".into()
        } else {
            "info".into()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()?;
    Ok(())
}
