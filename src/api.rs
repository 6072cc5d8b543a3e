//! Thin client for the backend endpoints the download flow relies on.

use reqwest::{Client, RequestBuilder, Response, Url};
use tracing::debug;

use crate::config::Settings;
use crate::error::DownloadError;
use crate::metadata::VideoDetails;

const USER_AGENT: &str = concat!("ryotube-downloads/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self, DownloadError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: Client, settings: &Settings) -> Self {
        Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token: settings.api_token.clone(),
        }
    }

    fn api_get(&self, path: &str) -> RequestBuilder {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET /api/get-video-by-id/{id}`.
    pub async fn video(&self, video_id: u64) -> Result<VideoDetails, DownloadError> {
        let wrap = |source| DownloadError::Metadata { video_id, source };
        self.api_get(&format!("/api/get-video-by-id/{video_id}"))
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(wrap)?
            .json::<VideoDetails>()
            .await
            .map_err(wrap)
    }

    /// `GET /api/download-url/{id}`: a time-limited direct URL to the video
    /// payload. The body is either a JSON string or plain text.
    pub async fn download_url(&self, video_id: u64) -> Result<Url, DownloadError> {
        let wrap = |source| DownloadError::Resolve { video_id, source };
        let body = self
            .api_get(&format!("/api/download-url/{video_id}"))
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(wrap)?
            .text()
            .await
            .map_err(wrap)?;

        let url = parse_transfer_url(&body).ok_or_else(|| DownloadError::UnusableUrl {
            video_id,
            value: body.clone(),
        })?;
        debug!(video_id, host = url.host_str().unwrap_or(""), "resolved transfer url");
        Ok(url)
    }

    /// Opens the streaming GET on a transfer URL. API credentials are not
    /// sent; the URL carries its own authorization.
    pub async fn open_transfer(&self, url: Url) -> Result<Response, DownloadError> {
        self.http
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(DownloadError::Open)
    }
}

fn parse_transfer_url(body: &str) -> Option<Url> {
    let trimmed = body.trim();
    let raw = match serde_json::from_str::<String>(trimmed) {
        Ok(decoded) => decoded,
        Err(_) => trimmed.to_string(),
    };
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
