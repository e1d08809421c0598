use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::endpoint::HttpMethod;
use crate::error::{Error, OperationError};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `https://host`, `http://host:port` or a bare host name (https assumed).
    pub host: String,
    pub credentials: Option<Credentials>,
    /// Accept self-signed appliance certificates.
    pub insecure: bool,
    /// Per-request network timeout, separate from any job deadline.
    pub timeout: Duration,
    /// Extra attempts for GETs answered with 429 or 503.
    pub retries: u32,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            credentials: None,
            insecure: false,
            timeout: Duration::from_secs(60),
            retries: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, OperationError> {
        serde_json::from_slice(&self.body).map_err(|e| OperationError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }

    /// Body as JSON; an empty body is `{}`.
    pub fn value(&self) -> Result<Value, OperationError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Default::default()));
        }
        self.json()
    }
}

/// Connection to one appliance. Read-only after construction; clones share
/// the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApplianceClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Option<Credentials>,
    retries: u32,
}

impl ApplianceClient {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let base_url = normalize_base_url(&config.host)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            base_url,
            http,
            credentials: config.credentials,
            retries: config.retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, OperationError> {
        self.send(HttpMethod::Get, path, &[], None).await
    }

    /// Sends one request; non-2xx statuses become `OperationError::Http`.
    pub async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, OperationError> {
        let url = self.url(path);
        let mut attempt = 0u32;
        loop {
            let mut req = self.http.request(method.to_reqwest(), &url);
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(creds) = &self.credentials {
                req = req.basic_auth(&creds.username, Some(&creds.password));
            }
            if let Some(body) = body {
                req = req.json(body);
            }
            req = req.header(reqwest::header::ACCEPT, "application/json");

            let resp = req
                .send()
                .await
                .map_err(|e| OperationError::from_reqwest(&url, e))?;
            let status = resp.status();
            debug!(method = %method, url = %url, status = status.as_u16(), "appliance request");

            if retryable(method, status) && attempt < self.retries {
                attempt += 1;
                let backoff = Duration::from_millis(200 * u64::from(attempt));
                debug!(url = %url, attempt, ?backoff, "retrying appliance request");
                tokio::time::sleep(backoff).await;
                continue;
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| OperationError::from_reqwest(&url, e))?;
            trace!(url = %url, len = bytes.len(), "response body read");

            if !status.is_success() {
                let body = String::from_utf8_lossy(&bytes).into_owned();
                return Err(OperationError::from_status(&url, status.as_u16(), body));
            }
            return Ok(ApiResponse {
                url,
                status: status.as_u16(),
                body: bytes.to_vec(),
            });
        }
    }
}

fn retryable(method: HttpMethod, status: StatusCode) -> bool {
    method == HttpMethod::Get
        && (status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE)
}

fn normalize_base_url(host: &str) -> Result<String, Error> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(Error::Config("appliance host is empty".to_string()));
    }
    if host.starts_with("http://") || host.starts_with("https://") {
        Ok(host.to_string())
    } else {
        Ok(format!("https://{}", host))
    }
}
