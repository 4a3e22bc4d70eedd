use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub market: MarketConfig,
}

/// Listing-site traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Listing root; pages are `{listing_url}/page/{n}`.
    pub listing_url: String,
    /// Origin that relative article links are resolved against.
    pub site_url: String,
    pub page_batch_size: u32,
    pub max_pages: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://www.nasdaq.com/news-and-insights/topic/markets".to_string(),
            site_url: "https://www.nasdaq.com".to_string(),
            page_batch_size: 10,
            max_pages: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_concurrent: usize,
    pub expected_status: u16,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_concurrent: 10,
            expected_status: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub insert_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            insert_batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub api_url: String,
    pub info_api_key: Option<String>,
    pub price_api_key: Option<String>,
    /// Sleep `cooldown_secs` before every `cooldown_every`-th ticker.
    pub cooldown_every: usize,
    pub cooldown_secs: u64,
    /// Maximum tickers touched in one run.
    pub query_limit: usize,
}

impl MarketConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Both keys are required before any market-data call is attempted.
    pub fn api_keys(&self) -> Result<(String, String)> {
        let info = self
            .info_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::MissingCredential("market.info_api_key"))?;
        let price = self
            .price_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::MissingCredential("market.price_api_key"))?;
        Ok((info, price))
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.alphavantage.co/query".to_string(),
            info_api_key: None,
            price_api_key: None,
            cooldown_every: 3,
            cooldown_secs: 65,
            query_limit: 25,
        }
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("market-news-collector");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("nasdaq.db").to_string_lossy().to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path`, writing a default config there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config {
                db_path: default_db_path(),
                ..Config::default()
            };
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.crawl.page_batch_size == 0 {
            return Err(AppError::Config("crawl.page_batch_size must be at least 1".into()));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::Config("fetch.max_concurrent must be at least 1".into()));
        }
        if self.ingest.insert_batch_size == 0 {
            return Err(AppError::Config("ingest.insert_batch_size must be at least 1".into()));
        }
        if self.market.cooldown_every == 0 {
            return Err(AppError::Config("market.cooldown_every must be at least 1".into()));
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("market-news-collector")
            .join("config.toml")
    }
}
