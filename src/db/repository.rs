use std::collections::HashSet;

use chrono::NaiveDate;
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{CompanyOverview, NewArticle, PriceBar, StockRow};

use super::schema::{REQUIRED_TABLES, SCHEMA};
use super::upsert::{self, Dimension};

/// Async handle over the single SQLite writer connection.
///
/// `tokio_rusqlite` runs every call on one background thread, so writes from
/// the ingestion and market-data pipelines never race on the dimension tables.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Opens an existing database. The schema must already be provisioned.
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        let repo = Self { conn };
        repo.enable_foreign_keys().await?;
        repo.ensure_schema().await?;
        Ok(repo)
    }

    /// Opens (or creates) the database and provisions every table.
    pub async fn create(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::provisioned(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::provisioned(conn).await
    }

    async fn provisioned(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    async fn enable_foreign_keys(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.pragma_update(None, "foreign_keys", "ON")?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        let present: HashSet<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(names)
            })
            .await?;

        match REQUIRED_TABLES.iter().find(|table| !present.contains(**table)) {
            Some(missing) => Err(AppError::MissingSchema(missing.to_string())),
            None => Ok(()),
        }
    }

    // Article operations

    pub async fn all_article_urls(&self) -> Result<HashSet<String>> {
        let urls = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT url FROM articles")?;
                let urls = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(urls)
            })
            .await?;
        Ok(urls)
    }

    /// Writes a whole flush batch in one transaction; on any error nothing
    /// from the batch is kept.
    pub async fn store_articles(&self, articles: Vec<NewArticle>) -> Result<Vec<i64>> {
        let ids = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut ids = Vec::with_capacity(articles.len());
                for article in &articles {
                    ids.push(upsert::store_article(&tx, article)?);
                }
                tx.commit()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    #[cfg(test)]
    pub async fn get_or_create(&self, dimension: Dimension, key: &str) -> Result<i64> {
        let key = key.to_string();
        let id = self
            .conn
            .call(move |conn| Ok(upsert::get_or_create(conn, dimension, &key)?))
            .await?;
        Ok(id)
    }

    #[cfg(test)]
    pub async fn link(&self, join: upsert::Join, article_id: i64, entity_id: i64) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| Ok(upsert::link(conn, join, article_id, entity_id)?))
            .await?;
        Ok(inserted)
    }

    #[cfg(test)]
    pub async fn insert_article(
        &self,
        author_id: i64,
        title: String,
        content: String,
        url: String,
        published_date: Option<chrono::NaiveDateTime>,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                Ok(upsert::insert_article(
                    conn,
                    author_id,
                    &title,
                    &content,
                    &url,
                    published_date,
                )?)
            })
            .await?;
        Ok(id)
    }

    // Stock operations

    /// Every known stock, those still awaiting enrichment first, then the
    /// least recently priced. Stocks without any stored bar come first in
    /// each group, so a capped run keeps rotating through the whole table.
    pub async fn stock_rows(&self) -> Result<Vec<StockRow>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT s.stock_id, s.stock_tick, s.name IS NOT NULL
                     FROM stocks s
                     LEFT JOIN (
                         SELECT stock_id, MAX(date) AS last_date
                         FROM stocks_prices
                         GROUP BY stock_id
                     ) p ON p.stock_id = s.stock_id
                     ORDER BY s.name IS NOT NULL, p.last_date NULLS FIRST, s.stock_tick",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(StockRow {
                            id: row.get(0)?,
                            ticker: row.get(1)?,
                            enriched: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn update_stock_info(&self, ticker: &str, overview: CompanyOverview) -> Result<i64> {
        let ticker = ticker.to_string();
        let id = self
            .conn
            .call(move |conn| Ok(upsert::update_stock_info(conn, &ticker, &overview)?))
            .await?;
        Ok(id)
    }

    pub async fn latest_price_date(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        let ticker = ticker.to_string();
        let latest = self
            .conn
            .call(move |conn| {
                let stock_id = upsert::get_or_create(conn, Dimension::Stock, &ticker)?;
                Ok(upsert::latest_price_date(conn, stock_id)?)
            })
            .await?;
        Ok(latest)
    }

    pub async fn insert_price_bars(&self, ticker: &str, bars: Vec<PriceBar>) -> Result<usize> {
        let ticker = ticker.to_string();
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let stock_id = upsert::get_or_create(&tx, Dimension::Stock, &ticker)?;
                let inserted = upsert::insert_price_bars(&tx, stock_id, &bars)?;
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    #[cfg(test)]
    pub async fn count_rows(&self, table: &'static str) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
            })
            .await?;
        Ok(count)
    }
}
