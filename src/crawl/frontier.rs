use chrono::{NaiveDateTime, Utc};
use futures::StreamExt;
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{AppError, Result};
use crate::extract::parse_listing;
use crate::fetch::{BoundedFetcher, Fetched, Transport};

/// Walks `{listing_url}/page/{n}` in fixed-size batches and collects article
/// links until the page budget runs out or a card older than the cutoff shows up.
pub struct FrontierWalker<'a, T> {
    fetcher: &'a BoundedFetcher<T>,
    listing_url: String,
    site: Url,
    page_batch_size: u32,
}

impl<'a, T: Transport> FrontierWalker<'a, T> {
    pub fn new(fetcher: &'a BoundedFetcher<T>, config: &CrawlConfig) -> Result<Self> {
        let site = Url::parse(&config.site_url)
            .map_err(|e| AppError::Config(format!("invalid crawl.site_url: {e}")))?;
        Ok(Self {
            fetcher,
            listing_url: config.listing_url.trim_end_matches('/').to_string(),
            site,
            page_batch_size: config.page_batch_size.max(1),
        })
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}/page/{}", self.listing_url, page)
    }

    pub async fn walk(&self, max_pages: u32, cutoff: Option<NaiveDateTime>) -> Vec<String> {
        self.walk_at(max_pages, cutoff, Utc::now().naive_utc()).await
    }

    /// Batches run strictly one after another: batch N+1 is only requested
    /// once batch N has been scanned for the cutoff. A batch that hits the
    /// cutoff is still fetched in full before the walk stops.
    #[instrument(level = "info", skip_all, fields(max_pages = max_pages, cutoff = ?cutoff))]
    async fn walk_at(
        &self,
        max_pages: u32,
        cutoff: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        let mut first = 1u32;
        let mut batch_number = 0u32;

        'batches: while first <= max_pages {
            let last = first
                .saturating_add(self.page_batch_size - 1)
                .min(max_pages);
            batch_number += 1;

            let urls: Vec<String> = (first..=last).map(|n| self.page_url(n)).collect();
            info!(batch = batch_number, first, last, "Fetching listing batch");
            let pages: Vec<Fetched> = self.fetcher.fetch_ordered(urls).collect().await;

            for page in pages {
                // Non-success pages were already logged by the fetcher.
                let Ok(body) = page.result else { continue };

                let mut listing = parse_listing(&body, &self.site, now);
                // The final card link on every listing page is not an article.
                listing.links.pop();

                if let Some(position) =
                    cutoff.and_then(|cutoff| cutoff_position(&listing.timestamps, cutoff))
                {
                    listing.links.truncate(position);
                    info!(url = %page.url, position, "Reached cutoff date, stopping walk");
                    links.extend(listing.links);
                    break 'batches;
                }

                if listing.links.is_empty() {
                    warn!(url = %page.url, "Could not scrape any article links from listing page");
                } else {
                    debug!(url = %page.url, count = listing.links.len(), "Scraped listing page");
                }
                links.extend(listing.links);
            }

            if last == max_pages {
                break;
            }
            first = last + 1;
        }

        let links: Vec<String> = links.into_iter().unique().collect();
        info!(count = links.len(), batches = batch_number, "Listing walk finished");
        links
    }
}

/// Index of the first timestamp older than `cutoff`. Only even positions are
/// checked; an older card at an odd position never stops the walk.
pub fn cutoff_position(timestamps: &[Option<NaiveDateTime>], cutoff: NaiveDateTime) -> Option<usize> {
    timestamps
        .iter()
        .enumerate()
        .step_by(2)
        .find_map(|(i, ts)| match ts {
            Some(ts) if *ts < cutoff => Some(i),
            _ => None,
        })
}
