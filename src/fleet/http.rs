//! HTTP reading store.
//!
//! Fetches `GET {base}/sensor-readings/{mac}/last` and uploads with
//! `POST {base}/sensors/{mac}`, both with a bearer token.

use crate::fleet::store::{FetchError, FetchFuture, LatestReadingBody, ReadingStore};
use crate::fleet::upload::{ReadingSink, ReadingUpload, UploadError, UploadFuture};
use crate::mac_address::MacAddress;
use log::debug;
use reqwest::StatusCode;

/// Longest server error body quoted in an [`UploadError::Rejected`].
const MAX_ERROR_BODY: usize = 100;

pub struct HttpReadingStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpReadingStore {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn reading_url(&self, sensor: MacAddress) -> String {
        latest_reading_url(&self.base_url, sensor)
    }
}

fn latest_reading_url(base_url: &str, sensor: MacAddress) -> String {
    format!("{}/sensor-readings/{}/last", base_url, sensor)
}

fn sensor_url(base_url: &str, sensor: MacAddress) -> String {
    format!("{}/sensors/{}", base_url, sensor)
}

/// Message of a rejected upload: the JSON `message` field when present,
/// otherwise the start of the body.
fn rejection_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("message")?.as_str().map(str::to_owned));
    match message {
        Some(message) => message,
        None => body.trim().chars().take(MAX_ERROR_BODY).collect(),
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout
        } else {
            UploadError::ConnectionFailure(err.to_string())
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            FetchError::ConnectionFailure(err.to_string())
        }
    }
}

impl ReadingStore for HttpReadingStore {
    fn latest(&self, sensor: MacAddress) -> FetchFuture<'_> {
        Box::pin(async move {
            let url = self.reading_url(sensor);
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            let status = response.status();
            debug!("GET {} -> {}", url, status);
            match status {
                StatusCode::OK => response.json::<LatestReadingBody>().await?.into_reading(),
                StatusCode::NOT_FOUND => Err(FetchError::NotFound),
                other => Err(FetchError::ServerError(other.as_u16())),
            }
        })
    }
}

impl ReadingSink for HttpReadingStore {
    fn upload(&self, sensor: MacAddress, reading: ReadingUpload) -> UploadFuture<'_> {
        Box::pin(async move {
            let url = sensor_url(&self.base_url, sensor);
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&reading)
                .send()
                .await?;

            let status = response.status();
            debug!("POST {} -> {}", url, status);
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(UploadError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body),
            })
        })
    }
}
