//! HTTP client for the calendar server.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use shared::{api, parse_events, CalendarEvent};
use std::time::Duration;

use crate::error::FetchError;

/// Result of a successful events request
#[derive(Debug)]
pub enum EventsResponse {
    Events(Vec<CalendarEvent>),
    /// Server is up but nobody is signed in
    Unauthenticated,
}

/// Client for the calendar server's JSON API.
///
/// Cookies set by the server are kept in a shared store and sent back on
/// later requests, so a signed-in browser session carries over.
#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl CalendarClient {
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            fetch_timeout,
        })
    }

    /// Hit the auth status endpoint and report the status code.
    pub async fn probe(&self, base: &str, timeout: Duration) -> Result<StatusCode, FetchError> {
        let url = api::auth_me_url(base);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        Ok(response.status())
    }

    /// Fetch the event list from an endpoint.
    pub async fn fetch_events(&self, base: &str) -> Result<EventsResponse, FetchError> {
        let url = api::events_url(base);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(EventsResponse::Unauthenticated);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;
        let body: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
                url: url.clone(),
                source,
            })?;

        Ok(EventsResponse::Events(parse_events(&body)))
    }
}
