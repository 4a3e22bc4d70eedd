/// Tables every command other than `init-db` expects to find.
pub const REQUIRED_TABLES: &[&str] = &[
    "authors",
    "articles",
    "stocks",
    "tags",
    "stock_articles",
    "article_tags",
    "stocks_prices",
];

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- authors table
CREATE TABLE IF NOT EXISTS authors (
    author_id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_name TEXT NOT NULL UNIQUE
);

-- articles table (insert-only, one row per canonical url)
CREATE TABLE IF NOT EXISTS articles (
    article_id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id INTEGER NOT NULL REFERENCES authors(author_id),
    title TEXT NOT NULL,
    article_content TEXT,
    url TEXT NOT NULL UNIQUE,
    published_date TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_articles_author_id ON articles(author_id);

-- stocks table (descriptive fields stay NULL until enriched)
CREATE TABLE IF NOT EXISTS stocks (
    stock_id INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_tick TEXT NOT NULL UNIQUE,
    name TEXT,
    currency TEXT,
    country TEXT,
    sector TEXT,
    industry TEXT
);

-- tags table
CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_name TEXT NOT NULL UNIQUE
);

-- stock_articles join table
CREATE TABLE IF NOT EXISTS stock_articles (
    stock_article_id INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_id INTEGER NOT NULL REFERENCES stocks(stock_id),
    article_id INTEGER NOT NULL REFERENCES articles(article_id),
    UNIQUE(article_id, stock_id)
);

-- article_tags join table
CREATE TABLE IF NOT EXISTS article_tags (
    article_tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_id INTEGER NOT NULL REFERENCES tags(tag_id),
    article_id INTEGER NOT NULL REFERENCES articles(article_id),
    UNIQUE(article_id, tag_id)
);

-- stocks_prices table (append-only daily bars)
CREATE TABLE IF NOT EXISTS stocks_prices (
    price_id INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_id INTEGER NOT NULL REFERENCES stocks(stock_id),
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    UNIQUE(stock_id, date)
);

CREATE INDEX IF NOT EXISTS idx_stocks_prices_stock_date ON stocks_prices(stock_id, date DESC);
"#;
