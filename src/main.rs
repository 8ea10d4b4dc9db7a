use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library instead of redeclaring modules
use radio_recorder::{
    catalog::StationCatalog, config::Config, database::Database, service::RecordingService,
};

#[derive(Parser)]
#[command(name = "radio-recorder")]
#[command(version = "0.1.0")]
#[command(about = "A radio stream recording service with scheduling and connection monitoring")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Station catalog JSON file (overrides config file)
    #[arg(short = 's', long, value_name = "FILE")]
    stations: Option<String>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = format!("radio_recorder={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Radio Recorder Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration from specified file
    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(stations) = cli.stations {
        config.storage.catalog_path = stations.into();
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let catalog = StationCatalog::load_or_empty(&config.storage.catalog_path);
    if catalog.is_empty() {
        info!(
            "No stations loaded from {}; jobs can be registered once the catalog is populated",
            config.storage.catalog_path.display()
        );
    }

    let service = RecordingService::new(config, catalog, database).await?;

    // Start scheduler service
    let scheduler = service.scheduler();
    tokio::spawn(async move {
        scheduler.run().await;
    });

    // Start connection monitor
    let monitor = service.connection_monitor();
    tokio::spawn(async move {
        monitor.run().await;
    });

    info!("Scheduler and connection monitor running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested, stopping background services");
    service.shutdown();

    Ok(())
}
