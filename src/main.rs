use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod crawl;
mod db;
mod error;
mod extract;
mod fetch;
mod ingest;
mod market;
mod models;

use app::App;
use cli::{Cli, Command};
use config::Config;
use db::Repository;
use error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = args.db {
        config.db_path = db;
    }

    match args.command {
        Command::InitDb => {
            Repository::create(&config.db_path).await?;
            info!(db = %config.db_path, "Database schema ready");
        }
        Command::Ingest { pages, since } => {
            let cutoff = since.and_then(|date| date.and_hms_opt(0, 0, 0));
            let app = App::new(config).await?;
            let report = app.ingest_new_articles(pages, cutoff).await?;
            println!(
                "Stored {} new articles ({} fetch failures, {} extraction failures)",
                report.stored, report.fetch_failed, report.extract_failed
            );
        }
        Command::UpdateStocks {
            limit,
            info_api_key,
            price_api_key,
        } => {
            if info_api_key.is_some() {
                config.market.info_api_key = info_api_key;
            }
            if price_api_key.is_some() {
                config.market.price_api_key = price_api_key;
            }
            // Missing keys are fatal before the database is touched.
            config.market.api_keys()?;

            let app = App::new(config).await?;
            let report = app.update_stocks(limit).await?;
            println!(
                "Updated {} tickers: {} enriched, {} price rows",
                report.tickers, report.enriched, report.price_rows
            );
        }
    }

    Ok(())
}
