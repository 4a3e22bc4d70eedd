use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::config::MarketConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::models::{PriceBar, StockRow};

use super::{ApiReply, MarketData};

/// Whether each endpoint may still be called in this run.
///
/// A flag only ever goes from `true` to `false`; the next run starts fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetFlags {
    pub info: bool,
    pub prices: bool,
}

impl Default for BudgetFlags {
    fn default() -> Self {
        Self {
            info: true,
            prices: true,
        }
    }
}

impl BudgetFlags {
    fn exhausted(&self) -> bool {
        !self.info && !self.prices
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub tickers: usize,
    pub enriched: usize,
    pub price_rows: usize,
    pub failures: usize,
    pub budget: BudgetFlags,
}

/// Bars strictly newer than `latest`, oldest first.
pub fn bars_after(mut bars: Vec<PriceBar>, latest: Option<NaiveDate>) -> Vec<PriceBar> {
    if let Some(latest) = latest {
        bars.retain(|bar| bar.date > latest);
    }
    bars.sort_by_key(|bar| bar.date);
    bars
}

/// Walks the stored tickers, filling in company details and appending new
/// daily bars while each endpoint's budget lasts.
pub struct StockUpdater<'a, M> {
    client: &'a M,
    repository: &'a Repository,
    cooldown_every: usize,
    cooldown: Duration,
    query_limit: usize,
}

impl<'a, M: MarketData> StockUpdater<'a, M> {
    pub fn new(client: &'a M, repository: &'a Repository, config: &MarketConfig) -> Self {
        Self {
            client,
            repository,
            cooldown_every: config.cooldown_every.max(1),
            cooldown: config.cooldown(),
            query_limit: config.query_limit,
        }
    }

    pub fn with_query_limit(mut self, query_limit: usize) -> Self {
        self.query_limit = query_limit;
        self
    }

    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<UpdateReport> {
        let stocks = self.repository.stock_rows().await?;
        let mut report = UpdateReport::default();
        info!(
            stocks = stocks.len(),
            limit = self.query_limit,
            "Starting stock update"
        );

        for (i, stock) in stocks.iter().take(self.query_limit).enumerate() {
            if report.budget.exhausted() {
                warn!("Both market data budgets exhausted; stopping early");
                break;
            }
            if i > 0 && i % self.cooldown_every == 0 {
                info!(cooldown = ?self.cooldown, processed = i, "Cooling down before next tickers");
                tokio::time::sleep(self.cooldown).await;
            }
            report.tickers += 1;

            if report.budget.info && !stock.enriched {
                self.update_info(stock, &mut report).await?;
            }
            if report.budget.prices {
                self.update_prices(stock, &mut report).await?;
            }
        }

        info!(
            tickers = report.tickers,
            enriched = report.enriched,
            price_rows = report.price_rows,
            failures = report.failures,
            info_budget = report.budget.info,
            price_budget = report.budget.prices,
            "Stock update finished"
        );
        Ok(report)
    }

    async fn update_info(&self, stock: &StockRow, report: &mut UpdateReport) -> Result<()> {
        match self.client.company_overview(&stock.ticker).await {
            Ok(ApiReply::Data(overview)) => {
                self.repository
                    .update_stock_info(&stock.ticker, overview)
                    .await?;
                report.enriched += 1;
            }
            Ok(ApiReply::RateLimited(note)) => {
                warn!(ticker = %stock.ticker, %note, "Overview budget exhausted for this run");
                report.budget.info = false;
            }
            Err(e) => {
                warn!(ticker = %stock.ticker, error = %e, "Overview request failed");
                report.failures += 1;
            }
        }
        Ok(())
    }

    async fn update_prices(&self, stock: &StockRow, report: &mut UpdateReport) -> Result<()> {
        match self.client.daily_prices(&stock.ticker).await {
            Ok(ApiReply::Data(bars)) => {
                let latest = self.repository.latest_price_date(&stock.ticker).await?;
                let fresh = bars_after(bars, latest);
                if !fresh.is_empty() {
                    let inserted = self
                        .repository
                        .insert_price_bars(&stock.ticker, fresh)
                        .await?;
                    info!(ticker = %stock.ticker, inserted, "Stored daily prices");
                    report.price_rows += inserted;
                }
            }
            Ok(ApiReply::RateLimited(note)) => {
                warn!(ticker = %stock.ticker, %note, "Price budget exhausted for this run");
                report.budget.prices = false;
            }
            Err(e) => {
                warn!(ticker = %stock.ticker, error = %e, "Price request failed");
                report.failures += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;
    use crate::db::upsert::Dimension;
    use crate::error::AppError;
    use crate::models::CompanyOverview;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Overview,
        Prices,
    }

    /// Answers with data unless the ticker is listed as limited or broken.
    #[derive(Default)]
    struct FakeMarket {
        info_limited: Vec<&'static str>,
        prices_limited: Vec<&'static str>,
        broken: Vec<&'static str>,
        bars: HashMap<&'static str, Vec<PriceBar>>,
        calls: Mutex<Vec<(Call, String)>>,
    }

    impl FakeMarket {
        fn calls(&self, kind: Call) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    impl MarketData for FakeMarket {
        async fn company_overview(&self, ticker: &str) -> Result<ApiReply<CompanyOverview>> {
            self.calls.lock().unwrap().push((Call::Overview, ticker.to_string()));
            if self.broken.iter().any(|t| *t == ticker) {
                return Err(AppError::MarketApi("boom".into()));
            }
            if self.info_limited.iter().any(|t| *t == ticker) {
                return Ok(ApiReply::RateLimited("Note".into()));
            }
            Ok(ApiReply::Data(CompanyOverview {
                name: Some(format!("{ticker} Inc")),
                currency: Some("USD".into()),
                ..CompanyOverview::default()
            }))
        }

        async fn daily_prices(&self, ticker: &str) -> Result<ApiReply<Vec<PriceBar>>> {
            self.calls.lock().unwrap().push((Call::Prices, ticker.to_string()));
            if self.prices_limited.iter().any(|t| *t == ticker) {
                return Ok(ApiReply::RateLimited("Note".into()));
            }
            Ok(ApiReply::Data(self.bars.get(ticker).cloned().unwrap_or_default()))
        }
    }

    fn bar(day: u32) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2023, 4, day).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10,
        }
    }

    fn config() -> MarketConfig {
        MarketConfig {
            cooldown_every: 3,
            cooldown_secs: 0,
            query_limit: 100,
            ..MarketConfig::default()
        }
    }

    async fn repo_with(tickers: &[&str]) -> Repository {
        let repo = Repository::in_memory().await.unwrap();
        for ticker in tickers {
            repo.get_or_create(Dimension::Stock, ticker).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn info_rate_limit_skips_overview_but_not_prices() {
        let repo = repo_with(&["AAA", "BBB", "CCC"]).await;
        let market = FakeMarket {
            info_limited: vec!["AAA"],
            ..FakeMarket::default()
        };

        let report = StockUpdater::new(&market, &repo, &config()).run().await.unwrap();

        assert_eq!(market.calls(Call::Overview), vec!["AAA"]);
        assert_eq!(market.calls(Call::Prices), vec!["AAA", "BBB", "CCC"]);
        assert!(!report.budget.info);
        assert!(report.budget.prices);
        assert_eq!(report.enriched, 0);
    }

    #[tokio::test]
    async fn price_rate_limit_is_sticky_for_the_run() {
        let repo = repo_with(&["AAA", "BBB", "CCC"]).await;
        let market = FakeMarket {
            prices_limited: vec!["BBB"],
            ..FakeMarket::default()
        };

        let report = StockUpdater::new(&market, &repo, &config()).run().await.unwrap();

        assert_eq!(market.calls(Call::Prices), vec!["AAA", "BBB"]);
        assert_eq!(market.calls(Call::Overview), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(report.enriched, 3);
        assert!(!report.budget.prices);
    }

    #[tokio::test]
    async fn both_budgets_gone_ends_the_run() {
        let repo = repo_with(&["AAA", "BBB"]).await;
        let market = FakeMarket {
            info_limited: vec!["AAA"],
            prices_limited: vec!["AAA"],
            ..FakeMarket::default()
        };

        let report = StockUpdater::new(&market, &repo, &config()).run().await.unwrap();
        assert_eq!(report.tickers, 1);
        assert_eq!(market.calls(Call::Prices), vec!["AAA"]);
    }

    #[tokio::test]
    async fn failed_call_does_not_flip_budget() {
        let repo = repo_with(&["AAA", "BBB"]).await;
        let market = FakeMarket {
            broken: vec!["AAA"],
            ..FakeMarket::default()
        };

        let report = StockUpdater::new(&market, &repo, &config()).run().await.unwrap();
        assert_eq!(report.failures, 1);
        assert!(report.budget.info);
        assert_eq!(market.calls(Call::Overview), vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn enriched_stocks_only_get_prices() {
        let repo = repo_with(&["AAA", "BBB"]).await;
        let market = FakeMarket::default();

        StockUpdater::new(&market, &repo, &config()).run().await.unwrap();
        StockUpdater::new(&market, &repo, &config()).run().await.unwrap();

        assert_eq!(market.calls(Call::Overview), vec!["AAA", "BBB"]);
        assert_eq!(market.calls(Call::Prices).len(), 4);
    }

    #[tokio::test]
    async fn overlapping_runs_append_only_new_days() {
        let repo = repo_with(&["AAA"]).await;
        let first = FakeMarket {
            bars: HashMap::from([("AAA", vec![bar(4), bar(3)])]),
            ..FakeMarket::default()
        };
        let second = FakeMarket {
            bars: HashMap::from([("AAA", vec![bar(3), bar(4), bar(5)])]),
            ..FakeMarket::default()
        };

        let one = StockUpdater::new(&first, &repo, &config()).run().await.unwrap();
        let two = StockUpdater::new(&second, &repo, &config()).run().await.unwrap();
        let three = StockUpdater::new(&second, &repo, &config()).run().await.unwrap();

        assert_eq!((one.price_rows, two.price_rows, three.price_rows), (2, 1, 0));
        assert_eq!(repo.count_rows("stocks_prices").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn query_limit_caps_tickers() {
        let repo = repo_with(&["AAA", "BBB", "CCC"]).await;
        let market = FakeMarket::default();

        let report = StockUpdater::new(&market, &repo, &config())
            .with_query_limit(2)
            .run()
            .await
            .unwrap();
        assert_eq!(report.tickers, 2);
    }

    #[tokio::test]
    async fn cooldown_runs_every_k_tickers() {
        let repo = repo_with(&["AAA", "BBB", "CCC", "DDD", "EEE"]).await;
        let market = FakeMarket::default();
        let config = MarketConfig {
            cooldown_every: 2,
            ..config()
        };
        let updater = StockUpdater {
            cooldown: Duration::from_millis(30),
            ..StockUpdater::new(&market, &repo, &config)
        };

        let started = Instant::now();
        updater.run().await.unwrap();

        // Sleeps before the 3rd and 5th tickers.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn capped_runs_rotate_through_every_ticker() {
        const TICKERS: [&str; 6] = ["T0", "T1", "T2", "T3", "T4", "T5"];
        let repo = repo_with(&TICKERS).await;
        let config = MarketConfig {
            query_limit: 3,
            ..config()
        };
        let bars_for = |days: &[u32]| -> HashMap<&'static str, Vec<PriceBar>> {
            TICKERS
                .iter()
                .map(|t| (*t, days.iter().map(|d| bar(*d)).collect()))
                .collect()
        };

        // Two runs enrich and price every ticker up to the 4th.
        let early = FakeMarket {
            bars: bars_for(&[3, 4]),
            ..FakeMarket::default()
        };
        for _ in 0..2 {
            StockUpdater::new(&early, &repo, &config).run().await.unwrap();
        }

        let later = FakeMarket {
            bars: bars_for(&[3, 4, 5]),
            ..FakeMarket::default()
        };
        for _ in 0..2 {
            StockUpdater::new(&later, &repo, &config).run().await.unwrap();
        }

        let mut priced = later.calls(Call::Prices);
        priced.sort();
        assert_eq!(priced, TICKERS);
        assert_eq!(repo.count_rows("stocks_prices").await.unwrap(), 18);
    }

    #[test]
    fn bars_after_filters_and_sorts() {
        let latest = NaiveDate::from_ymd_opt(2023, 4, 3);
        let bars = bars_after(vec![bar(5), bar(2), bar(3), bar(4)], latest);
        let days: Vec<_> = bars.iter().map(|b| b.date).collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2023, 4, 4).unwrap(),
                NaiveDate::from_ymd_opt(2023, 4, 5).unwrap(),
            ]
        );
        assert_eq!(bars_after(vec![bar(2)], None).len(), 1);
    }
}
