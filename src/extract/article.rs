use std::sync::LazyLock;

use chrono::{NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::ArticleFields;

use super::dates::parse_site_timestamp;
use super::Extract;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid article selector")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h1.jupiter22-c-hero-article-title"));
static AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| selector("span.jupiter22-c-author-byline__author-no-link"));
static TIMESTAMP: LazyLock<Selector> =
    LazyLock::new(|| selector("p.jupiter22-c-author-byline__timestamp"));
static TAGS: LazyLock<Selector> = LazyLock::new(|| selector("div.jupiter22-c-tags-container"));
static TAG_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static TICKERS: LazyLock<Selector> =
    LazyLock::new(|| selector("div.jupiter22-c-related-stocks-horizontal__list"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));

/// Extractor for `nasdaq.com/articles/...` pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NasdaqExtractor;

impl NasdaqExtractor {
    fn extract_at(&self, html: &str, now: NaiveDateTime) -> Result<ArticleFields> {
        if html.trim().is_empty() {
            return Err(AppError::Other(anyhow::anyhow!("empty article page")));
        }

        let document = Html::parse_document(html);
        let defaults = ArticleFields::default();

        let title = first_text(&document, &TITLE).unwrap_or(defaults.title);
        let author = first_text(&document, &AUTHOR).unwrap_or(defaults.author);
        let published_date = first_text(&document, &TIMESTAMP)
            .and_then(|text| parse_site_timestamp(&text, now));

        Ok(ArticleFields {
            title,
            author,
            published_date,
            tags: tags(&document),
            tickers: tickers(&document),
            content: content(&document),
        })
    }
}

impl Extract for NasdaqExtractor {
    fn extract(&self, html: &str) -> Result<ArticleFields> {
        self.extract_at(html, Utc::now().naive_utc())
    }
}

fn element_text(el: ElementRef<'_>, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| element_text(el, " "))
        .filter(|text| !text.is_empty())
}

fn tags(document: &Html) -> Vec<String> {
    let Some(container) = document.select(&TAGS).next() else {
        return Vec::new();
    };

    let linked: Vec<String> = container
        .select(&TAG_LINK)
        .map(|a| element_text(a, " "))
        .filter(|t| !t.is_empty())
        .collect();
    if !linked.is_empty() {
        return linked;
    }

    element_text(container, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// The related-stocks strip alternates symbol and percent change; symbols
/// sit at even positions and an unpaired trailing token is ignored.
fn tickers(document: &Html) -> Vec<String> {
    let Some(list) = document.select(&TICKERS).next() else {
        return Vec::new();
    };
    let text = element_text(list, " ");
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens
        .chunks_exact(2)
        .map(|pair| pair[0].to_string())
        .collect()
}

fn content(document: &Html) -> String {
    document
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
