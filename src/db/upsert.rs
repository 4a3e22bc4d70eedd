//! Synchronous write primitives run on the repository's connection thread.
//!
//! Everything here takes a plain `&Connection` so a caller can run several
//! steps inside one `Transaction` (which derefs to `Connection`).

use chrono::NaiveDate;
use itertools::Itertools;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{CompanyOverview, NewArticle, PriceBar};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reference tables shared by many articles, keyed by a unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Author,
    Tag,
    Stock,
}

impl Dimension {
    fn table(self) -> &'static str {
        match self {
            Dimension::Author => "authors",
            Dimension::Tag => "tags",
            Dimension::Stock => "stocks",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Dimension::Author => "author_id",
            Dimension::Tag => "tag_id",
            Dimension::Stock => "stock_id",
        }
    }

    fn key_column(self) -> &'static str {
        match self {
            Dimension::Author => "author_name",
            Dimension::Tag => "tag_name",
            Dimension::Stock => "stock_tick",
        }
    }
}

/// Many-to-many tables hanging off `articles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    ArticleStock,
    ArticleTag,
}

impl Join {
    fn table(self) -> &'static str {
        match self {
            Join::ArticleStock => "stock_articles",
            Join::ArticleTag => "article_tags",
        }
    }

    fn entity_column(self) -> &'static str {
        match self {
            Join::ArticleStock => "stock_id",
            Join::ArticleTag => "tag_id",
        }
    }
}

/// Returns the id for `key`, inserting the row first if it does not exist.
///
/// The no-op `DO UPDATE` makes `RETURNING` yield the existing id on conflict,
/// so lookup and insert are a single statement.
pub fn get_or_create(conn: &Connection, dimension: Dimension, key: &str) -> rusqlite::Result<i64> {
    let sql = format!(
        "INSERT INTO {table} ({key}) VALUES (?1)
         ON CONFLICT({key}) DO UPDATE SET {key} = excluded.{key}
         RETURNING {id}",
        table = dimension.table(),
        key = dimension.key_column(),
        id = dimension.id_column(),
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.query_row(params![key], |row| row.get(0))
}

/// Inserts a join row if absent. Returns whether a row was written.
pub fn link(conn: &Connection, join: Join, article_id: i64, entity_id: i64) -> rusqlite::Result<bool> {
    let sql = format!(
        "INSERT INTO {table} (article_id, {entity}) VALUES (?1, ?2)
         ON CONFLICT(article_id, {entity}) DO NOTHING",
        table = join.table(),
        entity = join.entity_column(),
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.execute(params![article_id, entity_id])? > 0)
}

/// Plain insert: a duplicate url is reported as a constraint error.
pub fn insert_article(
    conn: &Connection,
    author_id: i64,
    title: &str,
    content: &str,
    url: &str,
    published_date: Option<chrono::NaiveDateTime>,
) -> rusqlite::Result<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO articles (author_id, title, article_content, url, published_date)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING article_id",
    )?;
    stmt.query_row(
        params![
            author_id,
            title,
            content,
            url,
            published_date.map(|dt| dt.format(DATETIME_FORMAT).to_string()),
        ],
        |row| row.get(0),
    )
}

/// Author, article, stocks, tags and both join tables for one article.
pub fn store_article(conn: &Connection, article: &NewArticle) -> rusqlite::Result<i64> {
    let fields = &article.fields;
    let author_id = get_or_create(conn, Dimension::Author, &fields.author)?;
    let article_id = insert_article(
        conn,
        author_id,
        &fields.title,
        &fields.content,
        &article.url,
        fields.published_date,
    )?;

    for ticker in fields.tickers.iter().filter(|t| !t.is_empty()).unique() {
        let stock_id = get_or_create(conn, Dimension::Stock, ticker)?;
        link(conn, Join::ArticleStock, article_id, stock_id)?;
    }

    for tag in fields.tags.iter().filter(|t| !t.is_empty()).unique() {
        let tag_id = get_or_create(conn, Dimension::Tag, tag)?;
        link(conn, Join::ArticleTag, article_id, tag_id)?;
    }

    Ok(article_id)
}

/// Get-or-create the stock, then overwrite its descriptive fields.
pub fn update_stock_info(conn: &Connection, ticker: &str, overview: &CompanyOverview) -> rusqlite::Result<i64> {
    let stock_id = get_or_create(conn, Dimension::Stock, ticker)?;
    conn.execute(
        "UPDATE stocks SET name = ?1, currency = ?2, country = ?3, sector = ?4, industry = ?5
         WHERE stock_id = ?6",
        params![
            overview.name,
            overview.currency,
            overview.country,
            overview.sector,
            overview.industry,
            stock_id,
        ],
    )?;
    Ok(stock_id)
}

pub fn latest_price_date(conn: &Connection, stock_id: i64) -> rusqlite::Result<Option<NaiveDate>> {
    let latest: Option<String> = conn
        .query_row(
            "SELECT MAX(date) FROM stocks_prices WHERE stock_id = ?1",
            params![stock_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(latest.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()))
}

/// Appends bars dated after the latest stored bar; returns how many were written.
pub fn insert_price_bars(conn: &Connection, stock_id: i64, bars: &[PriceBar]) -> rusqlite::Result<usize> {
    let latest = latest_price_date(conn, stock_id)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO stocks_prices (stock_id, date, open, high, low, close, volume)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(stock_id, date) DO NOTHING",
    )?;

    let mut inserted = 0;
    for bar in bars
        .iter()
        .filter(|bar| latest.map_or(true, |latest| bar.date > latest))
        .sorted_by_key(|bar| bar.date)
    {
        inserted += stmt.execute(params![
            stock_id,
            bar.date.format(DATE_FORMAT).to_string(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
        ])?;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SCHEMA;
    use crate::models::ArticleFields;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn bar(date: &str, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let conn = conn();
        let first = get_or_create(&conn, Dimension::Author, "Chris Broad").unwrap();
        let second = get_or_create(&conn, Dimension::Author, "Chris Broad").unwrap();
        let other = get_or_create(&conn, Dimension::Author, "Scott Murdoch").unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(count(&conn, "authors"), 2);
    }

    #[test]
    fn link_ignores_duplicates() {
        let conn = conn();
        let author = get_or_create(&conn, Dimension::Author, "a").unwrap();
        let article = insert_article(&conn, author, "t", "c", "https://x/1", None).unwrap();
        let tag = get_or_create(&conn, Dimension::Tag, "Markets").unwrap();

        assert!(link(&conn, Join::ArticleTag, article, tag).unwrap());
        assert!(!link(&conn, Join::ArticleTag, article, tag).unwrap());
        assert_eq!(count(&conn, "article_tags"), 1);
    }

    #[test]
    fn duplicate_article_url_is_an_error() {
        let conn = conn();
        let author = get_or_create(&conn, Dimension::Author, "a").unwrap();
        insert_article(&conn, author, "t", "c", "https://x/1", None).unwrap();
        assert!(insert_article(&conn, author, "t2", "c2", "https://x/1", None).is_err());
    }

    #[test]
    fn store_article_writes_every_entity_once() {
        let conn = conn();
        let article = NewArticle::new(
            "https://www.nasdaq.com/articles/anz-suncorp",
            ArticleFields {
                title: "Australia regulator asks ANZ to justify benefits".into(),
                author: "Chris Broad".into(),
                tags: vec!["Markets".into(), "Banking".into()],
                tickers: vec!["ANZ".into(), "SUN".into()],
                ..ArticleFields::default()
            },
        );

        store_article(&conn, &article).unwrap();

        assert_eq!(count(&conn, "articles"), 1);
        assert_eq!(count(&conn, "authors"), 1);
        assert_eq!(count(&conn, "tags"), 2);
        assert_eq!(count(&conn, "stocks"), 2);
        assert_eq!(count(&conn, "article_tags"), 2);
        assert_eq!(count(&conn, "stock_articles"), 2);
    }

    #[test]
    fn repeated_tickers_are_linked_once() {
        let conn = conn();
        let article = NewArticle::new(
            "https://x/2",
            ArticleFields {
                tickers: vec!["ANZ".into(), "ANZ".into()],
                ..ArticleFields::default()
            },
        );
        store_article(&conn, &article).unwrap();
        assert_eq!(count(&conn, "stock_articles"), 1);
    }

    #[test]
    fn update_stock_info_fills_existing_row() {
        let conn = conn();
        let id = get_or_create(&conn, Dimension::Stock, "ANZ").unwrap();
        let overview = CompanyOverview {
            name: Some("ANZ Group".into()),
            currency: Some("AUD".into()),
            ..CompanyOverview::default()
        };

        assert_eq!(update_stock_info(&conn, "ANZ", &overview).unwrap(), id);
        let (name, currency): (Option<String>, Option<String>) = conn
            .query_row("SELECT name, currency FROM stocks WHERE stock_id = ?1", [id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(name.as_deref(), Some("ANZ Group"));
        assert_eq!(currency.as_deref(), Some("AUD"));
        assert_eq!(count(&conn, "stocks"), 1);
    }

    #[test]
    fn overlapping_price_updates_never_duplicate_dates() {
        let conn = conn();
        let stock = get_or_create(&conn, Dimension::Stock, "SUN").unwrap();

        let first = vec![bar("2023-04-03", 1.0), bar("2023-04-04", 2.0)];
        let second = vec![bar("2023-04-04", 9.0), bar("2023-04-05", 3.0), bar("2023-04-03", 9.0)];

        assert_eq!(insert_price_bars(&conn, stock, &first).unwrap(), 2);
        assert_eq!(insert_price_bars(&conn, stock, &second).unwrap(), 1);
        assert_eq!(insert_price_bars(&conn, stock, &second).unwrap(), 0);

        assert_eq!(count(&conn, "stocks_prices"), 3);
        assert_eq!(
            latest_price_date(&conn, stock).unwrap(),
            NaiveDate::from_ymd_opt(2023, 4, 5)
        );
        let stored_close: f64 = conn
            .query_row(
                "SELECT close FROM stocks_prices WHERE stock_id = ?1 AND date = '2023-04-04'",
                [stock],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored_close, 2.0);
    }
}
