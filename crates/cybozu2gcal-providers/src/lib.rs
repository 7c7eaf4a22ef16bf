//! Source scraping and destination calendar backends.
//!
//! - [`source`] - Cybozu login, page fetching and HTML extraction into [`RawEvent`]s
//! - [`normalize_event`] - Turns a [`RawEvent`] into a [`NormalizedEvent`]
//! - [`RemoteCalendar`] - The CRUD surface the sync engine writes through
//! - [`google`] - Google Calendar implementation of [`RemoteCalendar`]
//!
//! ```text
//! ┌─────────────────┐                       ┌──────────────────┐
//! │  Cybozu pages   │                       │ Google Calendar  │
//! └────────┬────────┘                       └────────▲─────────┘
//!          │ SourceCalendar                          │ RemoteCalendar
//!          ▼                                         │
//!    extract_events()                         ┌──────┴───────┐
//!          │                                  │ RemoteEvent  │
//!          ▼                                  └──────▲───────┘
//!    ┌──────────┐  normalize_event()  ┌───────────────┴──┐
//!    │ RawEvent ├────────────────────►│ NormalizedEvent  │
//!    └──────────┘                     └──────────────────┘
//! ```
//!
//! [`NormalizedEvent`]: cybozu2gcal_core::NormalizedEvent

pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod normalize;
pub mod raw_event;
pub mod remote;
pub mod source;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use normalize::{normalize_event, parse_title_time};
pub use raw_event::{RawEvent, RawEventKind};
pub use remote::{BoxFuture, RemoteCalendar, RemoteEvent};
pub use source::extract::{BannerRange, extract_banner_range, extract_events};
pub use source::session::CybozuSession;
pub use source::{SourceCalendar, SourcePage};
