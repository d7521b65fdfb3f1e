//! Backend client.
//!
//! `TransitApi` is the seam between the core and the REST backend. The core
//! is generic over it; `HttpBackend` is the reqwest implementation.

use std::future::Future;
use std::time::Duration;

use reqwest::{header, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use transit_proto::config::BackendConfig;
use transit_proto::protocol::{
    AddFavoriteRequest, AddFavoriteResponse, ErrorBody, FavoritesResponse, Outage, Station,
};
use transit_proto::FeedKey;

use crate::error::ApiError;

/// Result of a successful favorite-create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    /// 409: the backend already had it. Counts as success.
    AlreadyFavorite,
}

pub trait TransitApi: Send + Sync + 'static {
    fn fetch_stations(
        &self,
        feed: FeedKey,
    ) -> impl Future<Output = Result<Vec<Station>, ApiError>> + Send;

    /// Every station in the network, without arrivals.
    fn fetch_all_stations(&self) -> impl Future<Output = Result<Vec<Station>, ApiError>> + Send;

    /// Current elevator and escalator outages.
    fn fetch_outages(&self) -> impl Future<Output = Result<Vec<Outage>, ApiError>> + Send;

    fn fetch_favorites(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<String>, ApiError>> + Send;

    fn add_favorite(
        &self,
        token: &str,
        station_id: &str,
    ) -> impl Future<Output = Result<AddOutcome, ApiError>> + Send;

    fn remove_favorite(
        &self,
        token: &str,
        station_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Transport(format!(
                "base url {:?} cannot carry a path",
                base_url.as_str()
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.base_url,
            config.request_timeout(),
            &config.user_agent,
        )
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn favorites_endpoint(&self) -> Url {
        self.endpoint(&["api", "user", "favorites", "stations"])
    }
}

impl TransitApi for HttpBackend {
    async fn fetch_stations(&self, feed: FeedKey) -> Result<Vec<Station>, ApiError> {
        let url = self.endpoint(&["api", "stations", feed.as_str()]);
        debug!("[api] GET {}", url);
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }

    async fn fetch_all_stations(&self) -> Result<Vec<Station>, ApiError> {
        let url = self.endpoint(&["api", "stations"]);
        debug!("[api] GET {}", url);
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }

    async fn fetch_outages(&self) -> Result<Vec<Outage>, ApiError> {
        let url = self.endpoint(&["api", "accessibility", "outages"]);
        debug!("[api] GET {}", url);
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }

    async fn fetch_favorites(&self, token: &str) -> Result<Vec<String>, ApiError> {
        let url = self.favorites_endpoint();
        debug!("[api] GET {}", url);
        let resp = self.client.get(url).bearer_auth(token).send().await?;
        let body: FavoritesResponse = read_json(resp).await?;
        Ok(body.favorite_stations)
    }

    async fn add_favorite(&self, token: &str, station_id: &str) -> Result<AddOutcome, ApiError> {
        let url = self.favorites_endpoint();
        debug!("[api] POST {} station_id={}", url, station_id);
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .json(&AddFavoriteRequest {
                station_id: station_id.to_string(),
            })
            .send()
            .await?;

        if resp.status() == StatusCode::CONFLICT {
            return Ok(AddOutcome::AlreadyFavorite);
        }
        let body: AddFavoriteResponse = read_json(resp).await?;
        if body.favorite.station_id != station_id {
            return Err(ApiError::Malformed(format!(
                "created favorite {:?}, expected {:?}",
                body.favorite.station_id, station_id
            )));
        }
        Ok(AddOutcome::Created)
    }

    async fn remove_favorite(&self, token: &str, station_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "user", "favorites", "stations", station_id]);
        debug!("[api] DELETE {}", url);
        let resp = self.client.delete(url).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    if !resp.status().is_success() {
        return Err(status_error(resp).await);
    }
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Build a `Status` error, preferring the backend's `{"message": ...}` (or
/// `{"error": ...}`) text.
async fn status_error(resp: Response) -> ApiError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::text)
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}
