//! Google Calendar API client.
//!
//! This module provides a low-level HTTP client for the Google Calendar API
//! v3 events collection: request building, pagination, response parsing and
//! the mapping of HTTP statuses onto [`ProviderErrorCode`]s.
//!
//! [`ProviderErrorCode`]: crate::ProviderErrorCode

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use cybozu2gcal_core::EventTime;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::remote::{RemoteEvent, STATUS_CANCELLED};

use super::oauth::build_http_client;

/// Base URL for Google Calendar API v3.
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Largest page size the events.list endpoint accepts.
const MAX_PAGE_SIZE: usize = 2500;

/// Error reasons Google uses for throttling on a 403.
const RATE_LIMIT_MARKERS: [&str; 3] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "Rate Limit Exceeded",
];

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    /// Creates a new Google Calendar client.
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            api_base: CALENDAR_API_BASE.to_string(),
        })
    }

    /// Lists events whose end is after `time_min`, following every page.
    ///
    /// Cancelled events are dropped.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(access_token, calendar_id, time_min, page_token.as_deref())
                .await?;

            all_events.extend(page.items.into_iter().filter_map(ApiEvent::into_remote));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("fetched {} events from calendar {}", all_events.len(), calendar_id);
        Ok(all_events)
    }

    async fn list_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let mut request = self
            .http_client
            .get(self.events_url(calendar_id))
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("maxResults", MAX_PAGE_SIZE.to_string()),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        let body = read_success_body(response).await?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse event list: {}", e))
                .with_provider("google")
        })
    }

    /// Inserts an event with its own id.
    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> ProviderResult<()> {
        let response = self
            .http_client
            .post(self.events_url(calendar_id))
            .bearer_auth(access_token)
            .json(&ApiEvent::from_remote(event))
            .send()
            .await
            .map_err(transport_error)?;

        read_success_body(response).await?;
        debug!(id = %event.id, "inserted event");
        Ok(())
    }

    /// Replaces the event with the same id.
    pub async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> ProviderResult<()> {
        let response = self
            .http_client
            .put(self.event_url(calendar_id, &event.id))
            .bearer_auth(access_token)
            .json(&ApiEvent::from_remote(event))
            .send()
            .await
            .map_err(transport_error)?;

        read_success_body(response).await?;
        debug!(id = %event.id, "updated event");
        Ok(())
    }

    /// Deletes an event by id.
    pub async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> ProviderResult<()> {
        let response = self
            .http_client
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        read_success_body(response).await?;
        debug!(id = %event_id, "deleted event");
        Ok(())
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    };
    ProviderError::remote(message).with_provider("google")
}

async fn read_success_body(response: reqwest::Response) -> ProviderResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        ProviderError::remote(format!("failed to read response: {}", e)).with_provider("google")
    })?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_error(status, &body))
    }
}

/// Maps a failed API response onto a provider error.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("API error ({}): {}", status, body.trim());
    let error = match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(detail),
        StatusCode::FORBIDDEN if RATE_LIMIT_MARKERS.iter().any(|m| body.contains(m)) => {
            ProviderError::rate_limited(detail)
        }
        StatusCode::FORBIDDEN => ProviderError::authorization(detail),
        StatusCode::UNAUTHORIZED => {
            ProviderError::authentication("access token expired or invalid")
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => ProviderError::not_found(detail),
        StatusCode::CONFLICT => ProviderError::conflict(detail),
        s if s.is_server_error() => ProviderError::server(detail),
        _ => ProviderError::remote(detail),
    };
    if error.is_rate_limited() {
        warn!("rate limited by calendar API ({})", status);
    }
    error.with_provider("google")
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// A single event as the API reads and writes it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    start: ApiEventTime,
    end: ApiEventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

/// Event time from the API. Exactly one of `date` and `date_time` is set.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl ApiEvent {
    /// Builds the request body. All-day end dates are exclusive on the
    /// wire, so one day is added.
    fn from_remote(event: &RemoteEvent) -> Self {
        Self {
            id: Some(event.id.clone()),
            summary: Some(event.summary.clone()),
            start: ApiEventTime::from_event_time(&event.start, event.timezone.as_deref(), false),
            end: ApiEventTime::from_event_time(&event.end, event.timezone.as_deref(), true),
            status: event.status.clone(),
        }
    }

    /// Converts an API event, dropping cancelled and unparseable ones.
    fn into_remote(self) -> Option<RemoteEvent> {
        if self.status.as_deref() == Some(STATUS_CANCELLED) {
            return None;
        }

        let id = self.id?;
        let start = self.start.to_event_time(false).or_else(|| {
            warn!("event {} has no usable start time", id);
            None
        })?;
        let end = self.end.to_event_time(true).or_else(|| {
            warn!("event {} has no usable end time", id);
            None
        })?;

        Some(RemoteEvent {
            id,
            summary: self.summary.unwrap_or_default(),
            timezone: self.start.time_zone,
            start,
            end,
            status: self.status,
        })
    }
}

impl ApiEventTime {
    fn from_event_time(time: &EventTime, timezone: Option<&str>, is_end: bool) -> Self {
        match time {
            EventTime::DateTime(dt) => Self {
                date: None,
                date_time: Some(dt.to_rfc3339()),
                time_zone: timezone.map(String::from),
            },
            EventTime::AllDay(date) => {
                let date = if is_end { date.succ_opt().unwrap_or(*date) } else { *date };
                Self {
                    date: Some(date.format("%Y-%m-%d").to_string()),
                    date_time: None,
                    time_zone: timezone.map(String::from),
                }
            }
        }
    }

    fn to_event_time(&self, is_end: bool) -> Option<EventTime> {
        if let Some(ref dt) = self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .map_err(|e| warn!("failed to parse event time '{}': {}", dt, e))
                .ok()
                .map(EventTime::DateTime);
        }

        let date = self.date.as_deref()?;
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| warn!("failed to parse event date '{}': {}", date, e))
            .ok()?;
        let parsed = if is_end { parsed.pred_opt().unwrap_or(parsed) } else { parsed };
        Some(EventTime::AllDay(parsed))
    }
}
