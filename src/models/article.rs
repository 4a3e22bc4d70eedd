use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "Unknown";

/// Fields pulled out of one article page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleFields {
    pub title: String,
    pub author: String,
    pub published_date: Option<NaiveDateTime>,
    pub tags: Vec<String>,
    pub tickers: Vec<String>,
    pub content: String,
}

impl Default for ArticleFields {
    fn default() -> Self {
        Self {
            title: UNKNOWN.to_string(),
            author: UNKNOWN.to_string(),
            published_date: None,
            tags: Vec::new(),
            tickers: Vec::new(),
            content: String::new(),
        }
    }
}

/// An extracted article waiting to be flushed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub fields: ArticleFields,
}

impl NewArticle {
    pub fn new(url: impl Into<String>, fields: ArticleFields) -> Self {
        Self {
            url: url.into(),
            fields,
        }
    }
}
