//! Courier - delivers outbox events to their subscribers.

mod app;
mod subscribers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_config_and_utils::{init_logging, Config, Paths};
use courier_domain::FormEstablishment;

/// Courier command-line interface.
#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Transactional outbox crawler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, database and logs. Defaults to ~/.courier
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver undelivered events until interrupted
    Crawl {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Show outbox counts by status
    Status,
    /// Stop delivering an event
    Quarantine {
        /// Event id
        event_id: String,
    },
    /// Register an establishment and enqueue its announcement
    AddEstablishment {
        /// 14-digit SIRET
        siret: String,
        business_name: String,
        contact_email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(paths.central_log_file()))?;

    match cli.command {
        Commands::Crawl { once } => app::run_crawler(&config, &paths, once).await,
        Commands::Status => app::print_status(&config, &paths).await,
        Commands::Quarantine { event_id } => {
            app::quarantine_command(&config, &paths, &event_id).await
        }
        Commands::AddEstablishment {
            siret,
            business_name,
            contact_email,
        } => {
            let establishment = FormEstablishment {
                siret,
                business_name,
                contact_email,
            };
            app::add_establishment_command(&config, &paths, establishment).await
        }
    }
}
