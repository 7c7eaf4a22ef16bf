//! The Cybozu groupware source.
//!
//! - [`encoding`]: legacy page encodings
//! - [`session`]: form login and authenticated page fetches
//! - [`extract`]: markup to [`RawEvent`](crate::RawEvent) extraction
//!
//! The orchestrator talks to the source through [`SourceCalendar`], which
//! hands back decoded markup. Parsing into a document tree happens inside
//! the extractor, synchronously, so no tree is ever held across an await.

pub mod encoding;
pub mod extract;
pub mod session;

use chrono::NaiveDate;

use crate::error::ProviderResult;
use crate::remote::BoxFuture;

/// A decoded source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    /// URL the page was fetched from.
    pub url: String,
    /// Decoded markup.
    pub html: String,
}

impl SourcePage {
    /// Creates a page from its URL and decoded markup.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// An authenticated source of calendar pages.
pub trait SourceCalendar: Send + Sync {
    /// URL of the month view containing `date`.
    fn month_view_url(&self, date: NaiveDate) -> String;

    /// URL of the detail page of a banner event, from its link query string.
    fn banner_detail_url(&self, href_query: &str) -> String;

    /// Fetches and decodes one page. No caching, no retry.
    fn fetch_page<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProviderResult<SourcePage>>;
}
