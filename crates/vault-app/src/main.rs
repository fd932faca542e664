//! Collectible holdings client - Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vault_app::{AppConfig, Application, Backend};
use vault_source::{Fixture, HttpAssetApi, MemoryAssetApi, PageRequest};

/// Collectible holdings: status, delivery and consignment
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path (can also be set via VAULT_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Serve data from a JSON fixture instead of the HTTP API
    #[arg(long, global = true)]
    fixture: Option<String>,

    /// Print Prometheus metrics on exit
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct PageArgs {
    /// Page number (1-based)
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size
    #[arg(long, default_value_t = 20)]
    limit: u32,
}

impl PageArgs {
    fn request(self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List holdings with their status and permitted actions
    List {
        #[command(flatten)]
        page: PageArgs,
        /// Print the reconciled page as JSON
        #[arg(long)]
        json: bool,
    },
    /// Request delivery of a holding
    Deliver {
        holding: String,
        #[command(flatten)]
        page: PageArgs,
        /// Destination address id
        #[arg(long)]
        address: Option<String>,
        /// Confirm a forced pull-back of a previously consigned holding
        #[arg(long)]
        force: bool,
    },
    /// List a holding on the secondary market
    Consign {
        holding: String,
        price: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Follow the holding-period countdown of one holding
    Countdown {
        holding: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Browse public market listings
    Market {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config_path = AppConfig::resolve_path(args.config.clone());
    let (mut config, found) = AppConfig::load(&config_path)?;
    config.apply_env();

    vault_telemetry::init_logging(&config.telemetry)?;
    info!("Starting vault v{}", env!("CARGO_PKG_VERSION"));
    if found {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
    }

    let backend = match &args.fixture {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading fixture {path}"))?;
            info!(fixture = %path, "Using fixture backend");
            Backend::Memory(MemoryAssetApi::new(Fixture::from_json(&json)?))
        }
        None => {
            info!(base_url = %config.api.base_url, "Using HTTP backend");
            Backend::Http(HttpAssetApi::new(config.api.clone())?)
        }
    };

    let app = Application::new(config, backend)?;

    let result = match args.command {
        Command::List { page, json } => app.list(page.request(), json).await,
        Command::Deliver {
            holding,
            page,
            address,
            force,
        } => app.deliver(&holding, page.request(), address, force).await,
        Command::Consign {
            holding,
            price,
            page,
        } => app.consign(&holding, page.request(), &price).await,
        Command::Countdown { holding, page } => app.countdown(&holding, page.request()).await,
        Command::Market { page } => app.market(page.request()).await,
    };

    if args.print_metrics {
        print!("{}", vault_telemetry::gather_text()?);
    }

    result?;
    Ok(())
}
