//! `courier crawl`.

use super::open_database;
use crate::subscribers;
use courier_config_and_utils::{Config, Paths};
use courier_crawler::OutboxCrawler;
use courier_domain::SystemClock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run_crawler(config: &Config, paths: &Paths, once: bool) -> anyhow::Result<()> {
    let db = open_database(config, paths).await?;
    let crawler = Arc::new(OutboxCrawler::new(
        Arc::new(db.clone()),
        Arc::new(subscribers::router()),
        Arc::new(SystemClock),
        config.crawler_config(),
    )?);

    if once {
        let report = crawler.crawl_once().await?;
        println!(
            "fetched {}, delivered {}, partially failed {}, skipped {}, save errors {}",
            report.fetched,
            report.delivered,
            report.partially_failed,
            report.skipped,
            report.save_errors
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn({
        let crawler = crawler.clone();
        async move { crawler.run(shutdown_rx).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = worker.await {
        warn!(error = %e, "Crawler task ended abnormally");
    }
    db.close().await?;
    Ok(())
}
