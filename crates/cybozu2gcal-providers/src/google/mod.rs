//! Google Calendar as the sync destination.
//!
//! # Authorization
//!
//! 1. The user downloads a desktop OAuth client (`client_secret.json`) from
//!    Google Cloud Console into the config directory
//! 2. `cybozu2gcal auth` prints a consent URL with a PKCE challenge
//! 3. After consent the browser is sent to `http://localhost`; the user
//!    pastes that address (or just the `code` parameter) back
//! 4. The code is exchanged for tokens, which are saved to `token.json`
//!
//! Later runs load `token.json` through [`GoogleCalendar::connect`] and
//! refresh the access token as needed.

mod client;
mod config;
mod oauth;
mod provider;
mod tokens;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PendingAuthorization, PkceFlow, parse_authorization_answer};
pub use provider::GoogleCalendar;
pub use tokens::{TokenInfo, TokenStorage};
