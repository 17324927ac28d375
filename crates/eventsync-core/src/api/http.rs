//! HTTP implementation of the events API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    ApiError, ApiResult, EventSnapshot, EventsApi, InterestRequest, InterestStatus, ViewStatus,
};
use crate::config::Config;
use crate::models::{EventId, InterestAction};

/// reqwest-backed client for the events API
///
/// Every call is bounded by the configured timeout. Requests carry a bearer
/// token when one is configured and go out anonymously otherwise.
#[derive(Debug, Clone)]
pub struct HttpEventsApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpEventsApi {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Create a client from application configuration
    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Ok(Self::new(&config.api_url, config.request_timeout())?
            .with_auth_token(config.auth_token.clone()))
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn event_url(&self, event_id: EventId, suffix: &str) -> String {
        format!("{}/events/{}{}", self.base_url, event_id, suffix)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(classify_transport_error)?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if !status.is_success() {
        debug!("API responded with {} for {}", status, response.url());
        return Err(ApiError::from_status(status.as_u16()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

fn classify_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else if let Some(status) = error.status() {
        ApiError::from_status(status.as_u16())
    } else {
        ApiError::Network(error.to_string())
    }
}

#[async_trait]
impl EventsApi for HttpEventsApi {
    async fn get_event(&self, event_id: EventId) -> ApiResult<EventSnapshot> {
        self.send(self.client.get(self.event_url(event_id, ""))).await
    }

    async fn get_interest(&self, event_id: EventId) -> ApiResult<InterestStatus> {
        self.send(self.client.get(self.event_url(event_id, "/interest"))).await
    }

    async fn apply_interest(
        &self,
        event_id: EventId,
        action: InterestAction,
    ) -> ApiResult<InterestStatus> {
        let request = self
            .client
            .post(self.event_url(event_id, "/interest"))
            .json(&InterestRequest { action });
        self.send(request).await
    }

    async fn record_view(&self, event_id: EventId) -> ApiResult<ViewStatus> {
        self.send(self.client.post(self.event_url(event_id, "/view")))
            .await
    }
}
