use clap::{Parser, Subcommand};
use foodtruck_sync::startup;
use tracing::info;

#[derive(Parser)]
#[command(name = "foodtruck-sync")]
#[command(about = "Sync a food truck's published schedule into a Google Calendar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync once and exit
    Run {
        /// Extract and log the planned events without touching the calendar or state files
        #[arg(long)]
        dry_run: bool,
    },
    /// Keep running, syncing on SCHEDULE_DAYS at SCHEDULE_TIME
    Schedule,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    startup::init_logging()?;

    info!("Starting foodtruck-sync");

    // Load configuration
    let config = startup::load_config()?;

    match cli.command {
        Commands::Run { dry_run } => startup::run_once(&config, dry_run).await,
        Commands::Schedule => startup::run_scheduled(&config).await,
    }
}
