use std::pin::pin;

use futures::StreamExt;
use tracing::{error, info, instrument, warn};

use crate::config::IngestConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::extract::Extract;
use crate::fetch::{BoundedFetcher, Fetched, Transport};
use crate::models::NewArticle;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub fetch_failed: usize,
    pub extract_failed: usize,
    pub stored: usize,
    pub flushes: usize,
}

/// Fetches new article urls, extracts them and writes them to the store in
/// batches of `insert_batch_size`.
///
/// A url that fails to fetch or extract is dropped from the run. Because it
/// never reaches `articles`, the next walk finds it again.
pub struct Ingestor<'a, T, E> {
    fetcher: &'a BoundedFetcher<T>,
    extractor: &'a E,
    repository: &'a Repository,
    insert_batch_size: usize,
}

impl<'a, T: Transport, E: Extract> Ingestor<'a, T, E> {
    pub fn new(
        fetcher: &'a BoundedFetcher<T>,
        extractor: &'a E,
        repository: &'a Repository,
        config: &IngestConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            repository,
            insert_batch_size: config.insert_batch_size.max(1),
        }
    }

    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    pub async fn ingest(&self, urls: Vec<String>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut pending: Vec<NewArticle> = Vec::with_capacity(self.insert_batch_size);
        let mut completions = pin!(self.fetcher.fetch_unordered(urls));

        while let Some(Fetched { url, result }) = completions.next().await {
            let Ok(body) = result else {
                report.fetch_failed += 1;
                continue;
            };
            report.fetched += 1;

            match self.extractor.extract(&body) {
                Ok(fields) => pending.push(NewArticle::new(url, fields)),
                Err(e) => {
                    warn!(%url, error = %e, "Extraction failed; skipping article");
                    report.extract_failed += 1;
                    continue;
                }
            }

            if pending.len() >= self.insert_batch_size {
                self.flush(&mut pending, &mut report).await?;
            }
        }

        if !pending.is_empty() {
            self.flush(&mut pending, &mut report).await?;
        }

        info!(
            fetched = report.fetched,
            fetch_failed = report.fetch_failed,
            extract_failed = report.extract_failed,
            stored = report.stored,
            flushes = report.flushes,
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn flush(&self, pending: &mut Vec<NewArticle>, report: &mut IngestReport) -> Result<()> {
        let batch = std::mem::take(pending);
        let count = batch.len();

        if let Err(e) = self.repository.store_articles(batch).await {
            error!(count, error = %e, "Failed to store article batch; batch rolled back");
            return Err(e);
        }

        report.flushes += 1;
        report.stored += count;
        info!(count, total = report.stored, "Flushed article batch");
        Ok(())
    }
}
