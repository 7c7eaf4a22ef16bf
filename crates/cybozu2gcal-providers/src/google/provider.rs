//! Google Calendar implementation of [`RemoteCalendar`].

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::remote::{BoxFuture, RemoteCalendar, RemoteEvent};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::OAuthClient;
use super::tokens::{TokenInfo, TokenStorage};

/// Google Calendar as the sync destination.
///
/// Holds the saved OAuth token and refreshes it when it expires; refreshed
/// tokens are written back to the token file.
pub struct GoogleCalendar {
    api_client: GoogleCalendarClient,
    oauth_client: OAuthClient,
    token_storage: TokenStorage,
    tokens: Mutex<TokenInfo>,
}

impl std::fmt::Debug for GoogleCalendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCalendar")
            .field("token_path", &self.token_storage.path())
            .finish_non_exhaustive()
    }
}

impl GoogleCalendar {
    /// Connects using the token saved by a previous authorization.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if no token has been saved, or if
    /// the saved token lacks the configured scopes.
    pub fn connect(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate()?;

        let token_storage = TokenStorage::new(&config.token_path);
        let tokens = token_storage.load()?.ok_or_else(|| {
            ProviderError::authentication("not authorized - run `cybozu2gcal auth`")
                .with_provider("google")
        })?;

        if !tokens.has_scopes(&config.scopes) {
            return Err(ProviderError::authentication(
                "saved token lacks the calendar scope - run `cybozu2gcal auth` again",
            )
            .with_provider("google"));
        }

        let api_client = GoogleCalendarClient::new(config.timeout)?;
        let oauth_client = OAuthClient::new(config)?;

        Ok(Self {
            api_client,
            oauth_client,
            token_storage,
            tokens: Mutex::new(tokens),
        })
    }

    /// Returns a usable access token, refreshing it first if it expired.
    async fn access_token(&self) -> ProviderResult<String> {
        let mut tokens = self.tokens.lock().await;
        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
            ProviderError::authentication("no refresh token - run `cybozu2gcal auth` again")
                .with_provider("google")
        })?;

        debug!("refreshing expired access token");
        let (access_token, expires_in) = self.oauth_client.refresh_token(&refresh_token).await?;
        tokens.update_access_token(access_token, expires_in);
        self.token_storage.save(&tokens)?;
        info!("access token refreshed");

        Ok(tokens.access_token.clone())
    }
}

impl RemoteCalendar for GoogleCalendar {
    fn name(&self) -> &str {
        "google"
    }

    fn list_events<'a>(
        &'a self,
        calendar_id: &'a str,
        time_min: DateTime<Utc>,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            self.api_client.list_events(&token, calendar_id, time_min).await
        })
    }

    fn insert_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            self.api_client.insert_event(&token, calendar_id, event).await
        })
    }

    fn update_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            self.api_client.update_event(&token, calendar_id, event).await
        })
    }

    fn delete_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            self.api_client.delete_event(&token, calendar_id, event_id).await
        })
    }
}
