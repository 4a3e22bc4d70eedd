use std::sync::LazyLock;

use chrono::NaiveDateTime;
use scraper::{Html, Selector};
use url::Url;

use super::dates::parse_site_timestamp;

static CARD_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.content-feed__card-title-link[href]").expect("valid card link selector")
});
static CARD_TIMESTAMP: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".content-feed__card-timestamp").expect("valid card timestamp selector")
});

/// Links and card timestamps scraped from one listing page, in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub links: Vec<String>,
    /// One entry per timestamp element; unparsable text is kept as `None`
    /// so positions still line up with the page.
    pub timestamps: Vec<Option<NaiveDateTime>>,
}

pub fn parse_listing(html: &str, site: &Url, now: NaiveDateTime) -> ListingPage {
    let document = Html::parse_document(html);

    let links = document
        .select(&CARD_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| site.join(href).ok())
        .map(|url| url.to_string())
        .collect();

    let timestamps = document
        .select(&CARD_TIMESTAMP)
        .map(|el| parse_site_timestamp(&el.text().collect::<String>(), now))
        .collect();

    ListingPage { links, timestamps }
}
