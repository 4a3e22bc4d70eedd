//! Command-line interface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding `db_path` from the config
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Walk the listing pages and store every article not seen before
    Ingest {
        /// Listing pages to walk (overrides crawl.max_pages)
        #[arg(short, long)]
        pages: Option<u32>,

        /// Stop at the first card published before this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
    },

    /// Fetch company details and daily prices for stored tickers
    UpdateStocks {
        /// Maximum tickers to query (overrides market.query_limit)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, env = "ALPHAVANTAGE_INFO_KEY", hide_env_values = true)]
        info_api_key: Option<String>,

        #[arg(long, env = "ALPHAVANTAGE_PRICE_KEY", hide_env_values = true)]
        price_api_key: Option<String>,
    },

    /// Create the database tables
    InitDb,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_overrides() {
        let cli = Cli::parse_from([
            "market-news-collector",
            "ingest",
            "--pages",
            "30",
            "--since",
            "2023-04-01",
        ]);

        assert_eq!(
            cli.command,
            Command::Ingest {
                pages: Some(30),
                since: NaiveDate::from_ymd_opt(2023, 4, 1),
            }
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["market-news-collector", "init-db", "--db", "/tmp/x.db"]);
        assert_eq!(cli.command, Command::InitDb);
        assert_eq!(cli.db.as_deref(), Some("/tmp/x.db"));
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["market-news-collector", "ingest", "--since", "yesterday"]).is_err());
    }
}
