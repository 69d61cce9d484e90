//! HTTP client facade for the GPD-Upload service.
//!
//! Every call carries the subscription key (and the canary marker when
//! enabled). Error statuses come back as ordinary [`ApiResponse`] values;
//! only a transport failure with no response at all yields `None`.

mod response;

pub use response::ApiResponse;

use gpdload_types::{CANARY_HEADER, CANARY_VALUE, HttpMethod, SUBSCRIPTION_KEY_HEADER};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Content type declared for the uploaded archive part.
pub const ARCHIVE_MIME: &str = "application/zip";

/// Multipart field the service reads the archive from.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub subscription_key: Option<String>,
    pub canary: bool,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            subscription_key: None,
            canary: false,
            timeout: None,
        }
    }

    pub fn with_subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = Some(key.into());
        self
    }

    pub fn with_canary(mut self, canary: bool) -> Self {
        self.canary = canary;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("failed to read upload file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct GpdUploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl GpdUploadClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        url::Url::parse(&config.base_url).map_err(|source| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.subscription_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| ClientError::InvalidHeader(SUBSCRIPTION_KEY_HEADER))?;
            value.set_sensitive(true);
            headers.insert(header_name(SUBSCRIPTION_KEY_HEADER)?, value);
        }
        if config.canary {
            headers.insert(
                header_name(CANARY_HEADER)?,
                HeaderValue::from_static(CANARY_VALUE),
            );
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Build)?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through; anything else is appended to the base URL.
    pub fn resolve(&self, url: &str) -> String {
        if url::Url::parse(url).is_ok() {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    /// Sends a request with an optional JSON body.
    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Option<ApiResponse> {
        let url = self.resolve(url);
        debug!(%method, %url, "request");
        let mut req = self.http.request(to_reqwest(method), &url);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.complete(method, &url, req).await
    }

    /// Uploads an archive as the multipart field `file`.
    ///
    /// Failing to read the archive is an error; a transport failure is `Ok(None)`.
    pub async fn upload_file(
        &self,
        url: &str,
        path: &Path,
        method: HttpMethod,
    ) -> Result<Option<ApiResponse>, ClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file.zip".to_string());

        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(ARCHIVE_MIME)
            .map_err(ClientError::Build)?;
        let form = Form::new().part(FILE_FIELD, part);

        let url = self.resolve(url);
        debug!(%method, %url, archive = %path.display(), size, "upload");
        let req = self.http.request(to_reqwest(method), &url).multipart(form);
        Ok(self.complete(method, &url, req).await)
    }

    /// `GET /info`.
    pub async fn info(&self) -> Option<ApiResponse> {
        self.request(HttpMethod::Get, "/info", None).await
    }

    pub async fn status(&self, status_url: &str) -> Option<ApiResponse> {
        self.request(HttpMethod::Get, status_url, None).await
    }

    pub async fn report(&self, report_url: &str) -> Option<ApiResponse> {
        self.request(HttpMethod::Get, report_url, None).await
    }

    async fn complete(
        &self,
        method: HttpMethod,
        url: &str,
        req: reqwest::RequestBuilder,
    ) -> Option<ApiResponse> {
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%method, %url, error = %err, "error while calling service");
                return None;
            }
        };
        match ApiResponse::read(resp).await {
            Ok(resp) => {
                debug!(%method, %url, status = resp.status, "response");
                Some(resp)
            }
            Err(err) => {
                warn!(%method, %url, error = %err, "error while reading response body");
                None
            }
        }
    }
}

fn header_name(name: &'static str) -> Result<HeaderName, ClientError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| ClientError::InvalidHeader(name))
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}
