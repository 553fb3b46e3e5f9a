//! Command implementations.

mod crawl;
mod establishment;
mod status;

pub use crawl::run_crawler;
pub use establishment::add_establishment_command;
pub use status::{print_status, quarantine_command};

use courier_config_and_utils::{Config, Paths};
use courier_database::AsyncDatabase;

async fn open_database(config: &Config, paths: &Paths) -> anyhow::Result<AsyncDatabase> {
    let path = config.database_file(paths);
    Ok(AsyncDatabase::open(&path).await?)
}
