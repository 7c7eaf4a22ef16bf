//! Command-line interface definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use cybozu2gcal_core::{ConfigError, SourceSettings, SyncConfig, TracingOutputFormat};

/// cybozu2gcal - mirror a Cybozu groupware calendar into Google Calendar
#[derive(Debug, Parser)]
#[command(name = "cybozu2gcal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, env = "C2G_LOG_FORMAT", default_value = "compact", global = true)]
    pub log_format: TracingOutputFormat,

    /// Directory holding client_secret.json and token.json
    #[arg(long, env = "C2G_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Returns the config directory, falling back to `~/.config/cybozu2gcal`.
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(cybozu2gcal_core::default_config_dir)
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror the upcoming months into the target calendar
    Sync(SyncArgs),

    /// Authorize access to Google Calendar and save the token
    Auth(AuthArgs),
}

/// Settings for a sync run.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Cybozu login id
    #[arg(long, env = "C2G_CYBOZU_USERID")]
    pub cybozu_userid: String,

    /// Cybozu login password
    #[arg(long, env = "C2G_CYBOZU_USERPW", hide_env_values = true)]
    pub cybozu_userpw: String,

    /// Cybozu entry point, e.g. https://groupware.example/cgi-bin/cbag/ag.cgi
    #[arg(long, env = "C2G_CYBOZU_BASE_URL")]
    pub cybozu_base_url: String,

    /// Google Calendar id to write to
    #[arg(long, env = "C2G_CALENDAR_ID")]
    pub calendar_id: String,

    /// Cybozu user whose calendar is scraped (defaults to the login id)
    #[arg(long, env = "C2G_CYBOZU_TARGET_UID")]
    pub target_uid: Option<String>,

    /// IANA timezone of the Cybozu calendar
    #[arg(long, env = "C2G_TIMEZONE", default_value = "Asia/Tokyo")]
    pub timezone: String,

    /// Character encoding of the Cybozu pages
    #[arg(long, env = "C2G_SOURCE_ENCODING", default_value = SyncConfig::DEFAULT_ENCODING)]
    pub source_encoding: String,

    /// Months to sync after the current one
    #[arg(long, env = "C2G_MONTHS_AHEAD", default_value_t = 1)]
    pub months_ahead: u32,

    /// Days before today still owned by the sync
    #[arg(long, env = "C2G_LOOKBACK_DAYS", default_value_t = 0)]
    pub lookback_days: u32,

    /// Maximum number of events processed at once
    #[arg(long, env = "C2G_MAX_CONCURRENCY", default_value_t = 8)]
    pub max_concurrency: usize,

    /// Seconds to wait after a rate-limit response
    #[arg(
        long,
        env = "C2G_RETRY_DELAY_SECS",
        default_value_t = SyncConfig::DEFAULT_RETRY_DELAY_SECS
    )]
    pub retry_delay_secs: u64,

    /// Attempts per remote call before giving up (0 retries forever)
    #[arg(long, env = "C2G_RETRY_MAX_ATTEMPTS", default_value_t = 0)]
    pub retry_max_attempts: u32,

    /// HTTP request timeout in seconds
    #[arg(
        long,
        env = "C2G_TIMEOUT_SECS",
        default_value_t = SyncConfig::DEFAULT_TIMEOUT_SECS
    )]
    pub timeout_secs: u64,

    /// Log remote changes instead of making them
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

impl SyncArgs {
    /// Builds and validates the run configuration.
    pub fn to_config(&self, config_dir: PathBuf) -> Result<SyncConfig, ConfigError> {
        let mut source = SourceSettings::new(
            &self.cybozu_userid,
            &self.cybozu_userpw,
            &self.cybozu_base_url,
        )?
        .with_encoding(&self.source_encoding);
        if let Some(ref uid) = self.target_uid {
            source = source.with_target_uid(uid);
        }

        Ok(SyncConfig::new(source, &self.calendar_id)?
            .with_timezone_name(&self.timezone)?
            .with_months_ahead(self.months_ahead)?
            .with_lookback_days(self.lookback_days)?
            .with_max_concurrency(self.max_concurrency)?
            .with_retry(
                Duration::from_secs(self.retry_delay_secs),
                self.retry_max_attempts,
            )?
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_config_dir(config_dir)
            .with_dry_run(self.dry_run))
    }
}

/// Options for the authorization flow.
#[derive(Debug, Args)]
pub struct AuthArgs {
    /// Print the consent URL without trying to open a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Authorize again even if a token is already saved
    #[arg(long, short)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "cybozu2gcal",
        "sync",
        "--cybozu-userid",
        "alice",
        "--cybozu-userpw",
        "pw",
        "--cybozu-base-url",
        "https://groupware.example/cgi-bin/cbag/ag.cgi",
        "--calendar-id=primary",
    ];

    fn parse(extra: &[&str]) -> Cli {
        Cli::try_parse_from(REQUIRED.iter().chain(extra)).unwrap()
    }

    fn sync_args(cli: Cli) -> SyncArgs {
        match cli.command {
            Command::Sync(args) => args,
            Command::Auth(_) => panic!("expected sync"),
        }
    }

    #[test]
    fn sync_defaults() {
        let cli = parse(&[]);
        assert!(!cli.debug);
        assert_eq!(cli.log_format, TracingOutputFormat::Compact);

        let config = sync_args(cli).to_config(PathBuf::from("/tmp/c2g")).unwrap();
        assert_eq!(config.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.months_ahead, 1);
        assert_eq!(config.lookback_days, 0);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert!(config.retry_max_attempts.is_none());
        assert_eq!(config.source.encoding, "Shift_JIS");
        assert_eq!(config.source.target_uid, "alice");
        assert_eq!(config.token_path(), PathBuf::from("/tmp/c2g/token.json"));
        assert!(!config.dry_run);
    }

    #[test]
    fn sync_overrides() {
        let cli = parse(&[
            "--target-uid",
            "77",
            "--timezone",
            "Europe/Paris",
            "--months-ahead",
            "2",
            "--retry-max-attempts",
            "5",
            "--dry-run",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.log_format, TracingOutputFormat::Json);

        let config = sync_args(cli).to_config(PathBuf::from("/tmp")).unwrap();
        assert_eq!(config.source.target_uid, "77");
        assert_eq!(config.timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.months_ahead, 2);
        assert_eq!(config.retry_max_attempts, Some(5));
        assert!(config.dry_run);
    }

    #[test]
    fn invalid_settings_are_config_errors() {
        let args = sync_args(parse(&["--timezone", "Mars/Olympus"]));
        assert_eq!(
            args.to_config(PathBuf::from("/tmp")).unwrap_err(),
            ConfigError::UnknownTimezone("Mars/Olympus".to_string())
        );

        let args = sync_args(parse(&["--max-concurrency", "0"]));
        assert!(args.to_config(PathBuf::from("/tmp")).is_err());
    }

    #[test]
    fn huge_lookback_and_retry_delay_are_config_errors() {
        let args = sync_args(parse(&["--lookback-days", "4294967295"]));
        assert!(matches!(
            args.to_config(PathBuf::from("/tmp")),
            Err(ConfigError::OutOfRange { name: "lookback days", .. })
        ));

        let args = sync_args(parse(&["--retry-delay-secs", "18446744073709551615"]));
        assert!(matches!(
            args.to_config(PathBuf::from("/tmp")),
            Err(ConfigError::OutOfRange { name: "retry delay", .. })
        ));
    }

    #[test]
    fn bad_log_format_is_rejected() {
        let args = REQUIRED.iter().chain(&["--log-format", "xml"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn auth_flags() {
        let cli = Cli::try_parse_from(["cybozu2gcal", "auth", "--no-browser", "-f"]).unwrap();
        match cli.command {
            Command::Auth(args) => {
                assert!(args.no_browser);
                assert!(args.force);
            }
            Command::Sync(_) => panic!("expected auth"),
        }
    }
}
