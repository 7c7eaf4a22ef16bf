//! Core types: event times, normalized events, sync window, configuration, tracing

pub mod config;
pub mod event;
pub mod time;
pub mod tracing;

pub use config::{
    CLIENT_SECRET_FILE, ConfigError, SourceSettings, SyncConfig, TOKEN_FILE, default_config_dir,
};
pub use event::{NormalizedEvent, event_id};
pub use time::{EventTime, SyncWindow, local_to_zoned};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
