//! Event extraction from groupware markup.
//!
//! Extraction is table driven: each [`ExtractionRule`] says which elements
//! hold one event kind, where the title lives and which link tokens must be
//! present. When the markup changes, the table in [`RULES`] is the one place
//! to edit. The token parsers ([`parse_source_id`], [`parse_date_token`],
//! [`query_of`]) work on plain strings and know nothing about the HTML
//! library.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{ProviderError, ProviderResult};
use crate::raw_event::RawEvent;

static SOURCE_ID_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[?&;])sEID=(\d+)").expect("Invalid sEID regex"));

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Date=da\.(\d{4})\.(\d{1,2})\.(\d{1,2})").expect("Invalid date token regex")
});

static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("Invalid digits regex"));

/// Which kind of raw event a rule produces.
///
/// The kind also decides the link tokens: timed links must carry a
/// `Date=da.Y.M.D` token, banner links are dated by their detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Single-day event dated by the link's `Date=` token.
    Timed,
    /// Multi-day banner resolved through its detail page.
    Banner,
}

/// Where an event title is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    /// Text of the first descendant matching the selector, falling back to
    /// the text of the whole element.
    DescendantText(&'static str),
    /// Value of an attribute of the element.
    Attribute(&'static str),
}

/// One row of the extraction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRule {
    /// Event kind produced.
    pub kind: RuleKind,
    /// CSS selector for the event elements.
    pub selector: &'static str,
    /// Where the title comes from.
    pub title: TitleSource,
}

/// The extraction table for the month view.
pub const RULES: &[ExtractionRule] = &[
    ExtractionRule {
        kind: RuleKind::Timed,
        selector: ".event",
        title: TitleSource::DescendantText(".eventTitle"),
    },
    ExtractionRule {
        kind: RuleKind::Banner,
        selector: ".bannerevent",
        title: TitleSource::Attribute("title"),
    },
];

/// Names of the six dropdowns on a banner detail page, start then end.
pub const BANNER_DATE_FIELDS: [&str; 6] = [
    "SetDate.Year",
    "SetDate.Month",
    "SetDate.Day",
    "EndDate.Year",
    "EndDate.Month",
    "EndDate.Day",
];

/// The inclusive date range of a banner event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BannerRange {
    /// First day.
    pub first: NaiveDate,
    /// Last day (inclusive).
    pub last: NaiveDate,
}

/// Extracts raw events from a month view page using [`RULES`].
///
/// Each element yields either an event or the extraction error explaining
/// why it was skipped; one bad element never hides the others.
pub fn extract_events(html: &str) -> ProviderResult<Vec<ProviderResult<RawEvent>>> {
    extract_with_rules(html, RULES)
}

/// Extracts raw events with an explicit rule table.
///
/// # Errors
///
/// Fails only if a rule's selector does not parse.
pub fn extract_with_rules(
    html: &str,
    rules: &[ExtractionRule],
) -> ProviderResult<Vec<ProviderResult<RawEvent>>> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for rule in rules {
        let selector = parse_selector(rule.selector)?;
        let title_selector = match rule.title {
            TitleSource::DescendantText(sel) => Some(parse_selector(sel)?),
            TitleSource::Attribute(_) => None,
        };
        let link_selector = parse_selector("a[href]")?;

        for element in document.select(&selector) {
            results.push(apply_rule(
                rule,
                element,
                title_selector.as_ref(),
                &link_selector,
            ));
        }
    }

    Ok(results)
}

fn apply_rule(
    rule: &ExtractionRule,
    element: ElementRef<'_>,
    title_selector: Option<&Selector>,
    link_selector: &Selector,
) -> ProviderResult<RawEvent> {
    let href = element
        .value()
        .attr("href")
        .or_else(|| {
            element
                .select(link_selector)
                .next()
                .and_then(|link| link.value().attr("href"))
        })
        .ok_or_else(|| {
            ProviderError::extraction(format!(
                "{} element has no link: '{}'",
                rule.selector,
                element_text(element).trim()
            ))
        })?;

    let source_id = parse_source_id(href)
        .ok_or_else(|| ProviderError::extraction(format!("no sEID token in '{}'", href)))?;

    let title = match (rule.title, title_selector) {
        (TitleSource::Attribute(name), _) => {
            element.value().attr(name).unwrap_or_default().to_string()
        }
        (TitleSource::DescendantText(_), Some(sel)) => element
            .select(sel)
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(element)),
        (TitleSource::DescendantText(_), None) => element_text(element),
    };
    let title = title.trim().to_string();
    let query = query_of(href);

    match rule.kind {
        RuleKind::Timed => {
            let date = parse_date_token(href)?;
            Ok(RawEvent::timed(source_id, query, title, date))
        }
        RuleKind::Banner => Ok(RawEvent::banner(source_id, query, title)),
    }
}

/// Reads the date range from a banner detail page.
///
/// # Errors
///
/// Returns an extraction error if any of the six dropdowns has no selected
/// option with a leading number, if either date is not a real calendar
/// date, or if the range ends before it starts.
pub fn extract_banner_range(html: &str) -> ProviderResult<BannerRange> {
    let document = Html::parse_document(html);

    let mut values = [0u32; 6];
    for (slot, name) in values.iter_mut().zip(BANNER_DATE_FIELDS) {
        *slot = selected_number(&document, name)?;
    }
    let [sy, sm, sd, ey, em, ed] = values;

    let first = calendar_date(sy, sm, sd)?;
    let last = calendar_date(ey, em, ed)?;
    if last < first {
        return Err(ProviderError::extraction(format!(
            "banner range ends ({}) before it starts ({})",
            last, first
        )));
    }

    Ok(BannerRange { first, last })
}

fn selected_number(document: &Html, name: &str) -> ProviderResult<u32> {
    let selector = parse_selector(&format!("select[name='{}'] option[selected]", name))?;
    let option = document.select(&selector).next().ok_or_else(|| {
        ProviderError::extraction(format!("no selected option for '{}'", name))
    })?;

    let text = element_text(option);
    LEADING_DIGITS
        .find(text.trim())
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| {
            ProviderError::extraction(format!(
                "selected option for '{}' has no number: '{}'",
                name,
                text.trim()
            ))
        })
}

/// Returns the numeric `sEID` token of a link.
pub fn parse_source_id(href: &str) -> Option<String> {
    SOURCE_ID_TOKEN
        .captures(href)
        .map(|caps| caps[1].to_string())
}

/// Parses the `Date=da.YYYY.M.D` token of a link.
///
/// # Errors
///
/// Returns an extraction error if the token is missing or not a real date.
pub fn parse_date_token(href: &str) -> ProviderResult<NaiveDate> {
    let caps = DATE_TOKEN
        .captures(href)
        .ok_or_else(|| ProviderError::extraction(format!("no Date=da. token in '{}'", href)))?;

    let year: i32 = caps[1]
        .parse()
        .map_err(|_| ProviderError::extraction(format!("bad year in '{}'", href)))?;
    let month: u32 = caps[2]
        .parse()
        .map_err(|_| ProviderError::extraction(format!("bad month in '{}'", href)))?;
    let day: u32 = caps[3]
        .parse()
        .map_err(|_| ProviderError::extraction(format!("bad day in '{}'", href)))?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ProviderError::extraction(format!(
            "{}-{}-{} in '{}' is not a calendar date",
            year, month, day, href
        ))
    })
}

/// Returns the query string of a link, starting with `?`.
///
/// Links without a `?` are taken to be a bare query string.
pub fn query_of(href: &str) -> String {
    match href.find('?') {
        Some(pos) => href[pos..].to_string(),
        None => format!("?{}", href),
    }
}

fn calendar_date(year: u32, month: u32, day: u32) -> ProviderResult<NaiveDate> {
    i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
        .ok_or_else(|| {
            ProviderError::extraction(format!("{}-{}-{} is not a calendar date", year, month, day))
        })
}

fn parse_selector(selector: &str) -> ProviderResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| ProviderError::internal(format!("invalid selector '{}': {}", selector, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}
