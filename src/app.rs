use chrono::NaiveDateTime;
use tracing::info;

use crate::config::Config;
use crate::crawl::{delta, FrontierWalker};
use crate::db::Repository;
use crate::error::Result;
use crate::extract::NasdaqExtractor;
use crate::fetch::{BoundedFetcher, HttpTransport, Transport};
use crate::ingest::{IngestReport, Ingestor};
use crate::market::{AlphaVantageClient, MarketData, StockUpdater, UpdateReport};

pub struct App {
    config: Config,
    repository: Repository,
}

impl App {
    /// Opens the configured database; fails if the schema has not been provisioned.
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Repository::open(&config.db_path).await?;
        Ok(Self { config, repository })
    }

    #[cfg(test)]
    pub fn with_repository(config: Config, repository: Repository) -> Self {
        Self { config, repository }
    }

    pub async fn ingest_new_articles(
        &self,
        max_pages: Option<u32>,
        cutoff: Option<NaiveDateTime>,
    ) -> Result<IngestReport> {
        let transport = HttpTransport::new(&self.config.fetch)?;
        let fetcher = BoundedFetcher::new(transport, &self.config.fetch);
        self.ingest_with(&fetcher, max_pages, cutoff).await
    }

    /// Listing walk, then delta against stored urls, then fetch/extract/store.
    pub async fn ingest_with<T: Transport>(
        &self,
        fetcher: &BoundedFetcher<T>,
        max_pages: Option<u32>,
        cutoff: Option<NaiveDateTime>,
    ) -> Result<IngestReport> {
        let max_pages = max_pages.unwrap_or(self.config.crawl.max_pages);
        let walker = FrontierWalker::new(fetcher, &self.config.crawl)?;
        let discovered = walker.walk(max_pages, cutoff).await;

        let persisted = self.repository.all_article_urls().await?;
        let discovered_count = discovered.len();
        let fresh = delta(discovered, &persisted);
        info!(
            discovered = discovered_count,
            persisted = persisted.len(),
            new = fresh.len(),
            "Filtered already stored articles"
        );

        let extractor = NasdaqExtractor;
        Ingestor::new(fetcher, &extractor, &self.repository, &self.config.ingest)
            .ingest(fresh)
            .await
    }

    pub async fn update_stocks(&self, limit: Option<usize>) -> Result<UpdateReport> {
        let client = AlphaVantageClient::new(&self.config.market, &self.config.fetch)?;
        self.update_stocks_with(&client, limit).await
    }

    pub async fn update_stocks_with<M: MarketData>(
        &self,
        client: &M,
        limit: Option<usize>,
    ) -> Result<UpdateReport> {
        let limit = limit.unwrap_or(self.config.market.query_limit);
        StockUpdater::new(client, &self.repository, &self.config.market)
            .with_query_limit(limit)
            .run()
            .await
    }
}
