//! Run configuration.
//!
//! A [`SyncConfig`] is built once at startup (from CLI flags and environment
//! variables) and then shared read-only by every component of a run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;
use url::Url;

/// Errors raised while validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is empty.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// The source base URL is not an http(s) URL.
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The timezone is not a known IANA name.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// A numeric setting is out of range.
    #[error("invalid value for {name}: {reason}")]
    OutOfRange { name: &'static str, reason: String },
}

/// Credentials and location of the source groupware system.
#[derive(Clone)]
pub struct SourceSettings {
    /// Login id used for the form login.
    pub user_id: String,
    /// Login password.
    pub password: String,
    /// Full URL of the `ag.cgi` entry point.
    pub base_url: Url,
    /// User whose calendar is scraped. Defaults to the login user.
    pub target_uid: String,
    /// Encoding label of the served pages (e.g. `Shift_JIS`).
    pub encoding: String,
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("target_uid", &self.target_uid)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl SourceSettings {
    /// Creates source settings, validating the base URL.
    pub fn new(
        user_id: impl Into<String>,
        password: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, ConfigError> {
        let user_id = user_id.into();
        let password = password.into();
        if user_id.trim().is_empty() {
            return Err(ConfigError::Missing("source user id"));
        }
        if password.is_empty() {
            return Err(ConfigError::Missing("source password"));
        }
        let base_url = parse_base_url(base_url)?;

        Ok(Self {
            target_uid: user_id.clone(),
            user_id,
            password,
            base_url,
            encoding: SyncConfig::DEFAULT_ENCODING.to_string(),
        })
    }

    /// Builder: scrape another user's calendar.
    pub fn with_target_uid(mut self, uid: impl Into<String>) -> Self {
        self.target_uid = uid.into();
        self
    }

    /// Builder: set the page encoding label.
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::Missing("source base URL"));
    }
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source system settings.
    pub source: SourceSettings,

    /// Target remote calendar id.
    pub calendar_id: String,

    /// Timezone source times are expressed in.
    pub timezone: Tz,

    /// Months to sync after the current one.
    pub months_ahead: u32,

    /// Days before today that still belong to the sync window.
    pub lookback_days: u32,

    /// Maximum number of concurrent per-event tasks.
    pub max_concurrency: usize,

    /// Cooldown after a rate-limit response.
    pub retry_delay: Duration,

    /// Maximum attempts per remote call; `None` retries forever.
    pub retry_max_attempts: Option<u32>,

    /// HTTP request timeout for source and remote calls.
    pub request_timeout: Duration,

    /// Directory holding `client_secret.json` and `token.json`.
    pub config_dir: PathBuf,

    /// Log remote mutations instead of performing them.
    pub dry_run: bool,
}

impl SyncConfig {
    /// Default source page encoding.
    pub const DEFAULT_ENCODING: &'static str = "Shift_JIS";

    /// Default timezone of the source system.
    pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Tokyo;

    /// Default rate-limit cooldown in seconds.
    pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;

    /// Default HTTP timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Largest accepted look-back.
    pub const MAX_LOOKBACK_DAYS: u32 = 366;

    /// Largest accepted rate-limit cooldown.
    pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

    /// Creates a configuration with defaults for every optional setting.
    pub fn new(
        source: SourceSettings,
        calendar_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let calendar_id = calendar_id.into();
        if calendar_id.trim().is_empty() {
            return Err(ConfigError::Missing("calendar id"));
        }

        Ok(Self {
            source,
            calendar_id,
            timezone: Self::DEFAULT_TIMEZONE,
            months_ahead: 1,
            lookback_days: 0,
            max_concurrency: 8,
            retry_delay: Duration::from_secs(Self::DEFAULT_RETRY_DELAY_SECS),
            retry_max_attempts: None,
            request_timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            config_dir: default_config_dir(),
            dry_run: false,
        })
    }

    /// Builder: set the timezone from an IANA name.
    pub fn with_timezone_name(mut self, name: &str) -> Result<Self, ConfigError> {
        self.timezone = name
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))?;
        Ok(self)
    }

    /// Builder: set the number of months after the current one.
    pub fn with_months_ahead(mut self, months: u32) -> Result<Self, ConfigError> {
        if months > 12 {
            return Err(ConfigError::OutOfRange {
                name: "months ahead",
                reason: format!("{} is more than 12", months),
            });
        }
        self.months_ahead = months;
        Ok(self)
    }

    /// Builder: set the look-back in days.
    pub fn with_lookback_days(mut self, days: u32) -> Result<Self, ConfigError> {
        if days > Self::MAX_LOOKBACK_DAYS {
            return Err(ConfigError::OutOfRange {
                name: "lookback days",
                reason: format!("{} is more than {}", days, Self::MAX_LOOKBACK_DAYS),
            });
        }
        self.lookback_days = days;
        Ok(self)
    }

    /// Builder: set the concurrency limit.
    pub fn with_max_concurrency(mut self, max: usize) -> Result<Self, ConfigError> {
        if max == 0 {
            return Err(ConfigError::OutOfRange {
                name: "max concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        self.max_concurrency = max;
        Ok(self)
    }

    /// Builder: set rate-limit retry parameters. `max_attempts == 0` means unbounded.
    pub fn with_retry(mut self, delay: Duration, max_attempts: u32) -> Result<Self, ConfigError> {
        if delay > Self::MAX_RETRY_DELAY {
            return Err(ConfigError::OutOfRange {
                name: "retry delay",
                reason: format!(
                    "{}s is more than {}s",
                    delay.as_secs(),
                    Self::MAX_RETRY_DELAY.as_secs()
                ),
            });
        }
        self.retry_delay = delay;
        self.retry_max_attempts = (max_attempts > 0).then_some(max_attempts);
        Ok(self)
    }

    /// Builder: set the HTTP timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder: set the configuration directory.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Builder: enable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Path of the OAuth client secret file.
    pub fn client_secret_path(&self) -> PathBuf {
        self.config_dir.join(CLIENT_SECRET_FILE)
    }

    /// Path of the cached OAuth token.
    pub fn token_path(&self) -> PathBuf {
        self.config_dir.join(TOKEN_FILE)
    }
}

/// File name of the OAuth client secret inside the config directory.
pub const CLIENT_SECRET_FILE: &str = "client_secret.json";

/// File name of the saved OAuth token inside the config directory.
pub const TOKEN_FILE: &str = "token.json";

/// Returns the default configuration directory (`~/.config/cybozu2gcal`).
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cybozu2gcal")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceSettings {
        SourceSettings::new("alice", "secret", "http://groupware.example/cgi-bin/cbag/ag.cgi")
            .unwrap()
    }

    #[test]
    fn source_defaults_target_to_login_user() {
        let s = source();
        assert_eq!(s.target_uid, "alice");
        assert_eq!(s.encoding, "Shift_JIS");
        assert_eq!(s.base_url.path(), "/cgi-bin/cbag/ag.cgi");
    }

    #[test]
    fn source_debug_redacts_password() {
        let rendered = format!("{:?}", source());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn source_rejects_missing_values() {
        assert_eq!(
            SourceSettings::new("", "pw", "http://x/ag.cgi").unwrap_err(),
            ConfigError::Missing("source user id")
        );
        assert_eq!(
            SourceSettings::new("u", "", "http://x/ag.cgi").unwrap_err(),
            ConfigError::Missing("source password")
        );
        assert_eq!(
            SourceSettings::new("u", "pw", " ").unwrap_err(),
            ConfigError::Missing("source base URL")
        );
    }

    #[test]
    fn source_rejects_bad_urls() {
        assert!(matches!(
            SourceSettings::new("u", "pw", "not a url"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            SourceSettings::new("u", "pw", "ftp://x/ag.cgi"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn config_defaults() {
        let config = SyncConfig::new(source(), "cal@group.calendar.google.com").unwrap();
        assert_eq!(config.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.months_ahead, 1);
        assert_eq!(config.lookback_days, 0);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert!(config.retry_max_attempts.is_none());
        assert!(!config.dry_run);
        assert!(config.token_path().ends_with("token.json"));
        assert!(config.client_secret_path().ends_with("client_secret.json"));
    }

    #[test]
    fn config_requires_calendar_id() {
        assert_eq!(
            SyncConfig::new(source(), "").unwrap_err(),
            ConfigError::Missing("calendar id")
        );
    }

    #[test]
    fn config_builder_methods() {
        let config = SyncConfig::new(source(), "cal")
            .unwrap()
            .with_timezone_name("Europe/Paris")
            .unwrap()
            .with_months_ahead(2)
            .unwrap()
            .with_max_concurrency(3)
            .unwrap()
            .with_lookback_days(7)
            .unwrap()
            .with_retry(Duration::from_secs(1), 5)
            .unwrap()
            .with_config_dir("/tmp/c2g")
            .with_dry_run(true);

        assert_eq!(config.timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.months_ahead, 2);
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.lookback_days, 7);
        assert_eq!(config.retry_max_attempts, Some(5));
        assert_eq!(config.token_path(), PathBuf::from("/tmp/c2g/token.json"));
        assert!(config.dry_run);
    }

    #[test]
    fn config_rejects_invalid_values() {
        let config = SyncConfig::new(source(), "cal").unwrap();
        assert!(matches!(
            config.clone().with_timezone_name("Mars/Olympus"),
            Err(ConfigError::UnknownTimezone(_))
        ));
        assert!(matches!(
            config.clone().with_max_concurrency(0),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            config.with_months_ahead(13),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn zero_attempts_means_unbounded() {
        let config = SyncConfig::new(source(), "cal")
            .unwrap()
            .with_retry(Duration::from_secs(2), 0)
            .unwrap();
        assert!(config.retry_max_attempts.is_none());
    }

    #[test]
    fn lookback_is_bounded() {
        let config = SyncConfig::new(source(), "cal").unwrap();
        let accepted = config.clone().with_lookback_days(366).unwrap();
        assert_eq!(accepted.lookback_days, 366);
        assert_eq!(
            config.clone().with_lookback_days(367).unwrap_err(),
            ConfigError::OutOfRange {
                name: "lookback days",
                reason: "367 is more than 366".to_string(),
            }
        );
        assert!(matches!(
            config.with_lookback_days(u32::MAX),
            Err(ConfigError::OutOfRange { name: "lookback days", .. })
        ));
    }

    #[test]
    fn retry_delay_is_bounded() {
        let config = SyncConfig::new(source(), "cal").unwrap();
        assert!(config.clone().with_retry(Duration::from_secs(3600), 0).is_ok());
        assert!(matches!(
            config.with_retry(Duration::from_secs(u64::MAX), 0),
            Err(ConfigError::OutOfRange { name: "retry delay", .. })
        ));
    }
}
