//! Authenticated access to the groupware pages.
//!
//! [`CybozuSession::login`] posts the login form and keeps the `AGSESSID`
//! session cookie; every page fetch then sends it back together with a
//! browser-like header set, since the server turns away obvious bots.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use cybozu2gcal_core::SourceSettings;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, info};
use url::Url;

use super::encoding::{decode, encoding_for_label};
use super::{SourceCalendar, SourcePage};
use crate::error::{ProviderError, ProviderResult};
use crate::remote::BoxFuture;

/// Name of the session cookie set by a successful login.
pub const SESSION_COOKIE: &str = "AGSESSID";

/// Name of the cookie carrying the login id.
pub const LOGIN_ID_COOKIE: &str = "AGLOGINID";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/49.0.2623.75 Safari/537.36";

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

static SCHEDULE_VIEW_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([?&])page=ScheduleView(&|$)").expect("Invalid page selector regex")
});

/// A logged-in session on the groupware.
pub struct CybozuSession {
    http: reqwest::Client,
    settings: SourceSettings,
    encoding: &'static Encoding,
    session_id: String,
}

impl fmt::Debug for CybozuSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CybozuSession")
            .field("settings", &self.settings)
            .field("encoding", &self.encoding.name())
            .field("session_id", &"<redacted>")
            .finish()
    }
}

impl CybozuSession {
    /// Logs in and returns a session ready to fetch pages.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown page encoding and an
    /// authentication error if the request fails or no session cookie comes
    /// back.
    pub async fn login(settings: SourceSettings, timeout: Duration) -> ProviderResult<Self> {
        let encoding = encoding_for_label(&settings.encoding)?;

        // Redirects are not followed: the login answer carries the cookie on
        // the first response, and a redirect on a page fetch means the
        // session was rejected.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .default_headers(browser_headers())
            .build()
            .map_err(|e| ProviderError::internal(format!("failed to create HTTP client: {}", e)))?;

        let login_url = entry_point(&settings.base_url);
        debug!(url = %login_url, user = %settings.user_id, "logging in to groupware");

        let response = http
            .post(&login_url)
            .form(&login_form(&settings))
            .send()
            .await
            .map_err(|e| {
                ProviderError::authentication(format!("login request failed: {}", e))
                    .with_provider("cybozu")
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ProviderError::authentication(format!(
                "login rejected with status {}",
                status
            ))
            .with_provider("cybozu"));
        }

        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok());

        let session_id = find_cookie(set_cookies, SESSION_COOKIE).ok_or_else(|| {
            ProviderError::authentication(format!(
                "login response did not set {}; check the user id and password",
                SESSION_COOKIE
            ))
            .with_provider("cybozu")
        })?;

        info!(user = %settings.user_id, "logged in to groupware");
        Ok(Self {
            http,
            settings,
            encoding,
            session_id,
        })
    }

    fn cookie_header(&self) -> String {
        format!(
            "{}={}; {}={};",
            SESSION_COOKIE, self.session_id, LOGIN_ID_COOKIE, self.settings.user_id
        )
    }

    async fn get(&self, url: &str) -> ProviderResult<SourcePage> {
        debug!(url, "fetching groupware page");

        let response = self
            .http
            .get(url)
            .header(header::COOKIE, self.cookie_header())
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("request to {} timed out", url)
                } else {
                    format!("request to {} failed: {}", url, e)
                };
                ProviderError::fetch(message).with_provider("cybozu")
            })?;

        let status = response.status();
        if status.is_redirection() {
            return Err(ProviderError::fetch(format!(
                "{} redirected with status {}; the session was not accepted",
                url, status
            ))
            .with_provider("cybozu"));
        }
        if !status.is_success() {
            return Err(
                ProviderError::fetch(format!("{} returned status {}", url, status))
                    .with_provider("cybozu"),
            );
        }

        let body = response.bytes().await.map_err(|e| {
            ProviderError::fetch(format!("failed to read body of {}: {}", url, e))
                .with_provider("cybozu")
        })?;

        let html = decode(&body, self.encoding).map_err(|e| e.with_provider("cybozu"))?;
        debug!(url, bytes = body.len(), "decoded groupware page");
        Ok(SourcePage::new(url, html))
    }
}

impl SourceCalendar for CybozuSession {
    fn month_view_url(&self, date: NaiveDate) -> String {
        month_view_url(&self.settings.base_url, &self.settings.target_uid, date)
    }

    fn banner_detail_url(&self, href_query: &str) -> String {
        banner_detail_url(&self.settings.base_url, href_query)
    }

    fn fetch_page<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProviderResult<SourcePage>> {
        Box::pin(self.get(url))
    }
}

/// Finds a cookie value in a set of `Set-Cookie` header values.
///
/// Every header is split on `;` and each `key=value` pair is compared by
/// key. Attributes without `=` (like `HttpOnly`) are skipped, and so are
/// empty values.
pub fn find_cookie<'a>(
    set_cookie_headers: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> Option<String> {
    set_cookie_headers
        .into_iter()
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

/// Builds the month view URL for the month containing `date`.
pub fn month_view_url(base: &Url, target_uid: &str, date: NaiveDate) -> String {
    format!(
        "{}?page=ScheduleUserMonth&UID={}&Date=da.{:04}.{:02}.{:02}",
        entry_point(base),
        urlencoding::encode(target_uid),
        date.year(),
        date.month(),
        date.day()
    )
}

/// Builds the banner detail URL from the query string of a banner link.
///
/// The `page=ScheduleView` selector is rewritten to `page=ScheduleBannerModify`;
/// the rest of the query is kept verbatim.
pub fn banner_detail_url(base: &Url, href_query: &str) -> String {
    let query = if href_query.starts_with('?') {
        href_query.to_string()
    } else {
        format!("?{}", href_query)
    };
    let rewritten = SCHEDULE_VIEW_PAGE.replace(&query, "${1}page=ScheduleBannerModify${2}");
    format!("{}{}", entry_point(base), rewritten)
}

/// The base URL without query or fragment.
fn entry_point(base: &Url) -> String {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

fn login_form(settings: &SourceSettings) -> [(&'static str, &str); 6] {
    [
        ("_ID", settings.user_id.as_str()),
        ("Password", settings.password.as_str()),
        ("csrf_ticket", ""),
        ("_System", "login"),
        ("_Login", "1"),
        ("LoginMethod", "0"),
    ]
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}
