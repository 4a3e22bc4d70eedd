//! HTML field extraction for the Nasdaq listing and article pages.

mod article;
pub mod dates;
pub mod listing;

pub use article::NasdaqExtractor;
pub use listing::parse_listing;

use crate::error::Result;
use crate::models::ArticleFields;

/// Turns a fetched article page into structured fields.
///
/// Missing fields fall back to [`ArticleFields::default`] values; an `Err`
/// means the page could not be used at all and the article is skipped.
pub trait Extract {
    fn extract(&self, html: &str) -> Result<ArticleFields>;
}
