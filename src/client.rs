//! Calls into the case backend's `/backend-api/*` endpoints.

use crate::payload::ResultPayload;
use crate::render::ItemAction;
use cookie::Cookie;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "_archseek_server_session";
pub const QUERY_ENDPOINT: &str = "/backend-api/query";
pub const APPLY_WEIGHTS_ENDPOINT: &str = "/backend-api/apply-weights";
/// Case images, referenced by `CaseEntry::image_path`.
pub const IMAGE_PREFIX: &str = "/backend-api/img/";
/// Uploaded query images, referenced by `ResultPayload::image_path`.
pub const TEMP_PREFIX: &str = "/temp/";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status} for {endpoint}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },
}

/// The backend operations the page can trigger. Every call answers with a fresh payload.
pub trait CaseApi: Send + Sync {
    fn mutate(
        &self,
        action: ItemAction,
        case_id: &str,
    ) -> impl Future<Output = Result<ResultPayload, ClientError>> + Send;

    fn query(&self, input: &str)
    -> impl Future<Output = Result<ResultPayload, ClientError>> + Send;

    fn apply_weights(
        &self,
        weights: &[f64],
    ) -> impl Future<Output = Result<ResultPayload, ClientError>> + Send;
}

/// A static file served by the backend, status included.
#[derive(Debug, Clone)]
pub struct Asset {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub timeout: Duration,
    pub session_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            timeout: Duration::from_secs(30),
            session_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpCaseApi {
    client: reqwest::Client,
    backend_url: String,
    session_id: Option<String>,
}

impl HttpCaseApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        info!(backend = %config.backend_url, "case backend client ready");
        Ok(Self {
            client,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
            session_id: config.session_id,
        })
    }

    /// Same connection pool, different backend session.
    pub fn with_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            backend_url: self.backend_url.clone(),
            session_id: Some(session_id.into()),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// GETs a backend-relative path such as `/backend-api/img/...`. Error
    /// statuses are returned in the `Asset`, not as `ClientError::Status`.
    pub async fn fetch_asset(&self, path_and_query: &str) -> Result<Asset, ClientError> {
        let url = format!("{}{}", self.backend_url, path_and_query);
        let mut request = self.client.get(&url);
        if let Some(session_id) = self.session_id.as_deref() {
            request = request.header(COOKIE, Cookie::new(SESSION_COOKIE, session_id).to_string());
        }
        debug!(%url, "fetching backend asset");
        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(Asset {
            status,
            content_type,
            body,
        })
    }

    async fn post_form(
        &self,
        endpoint: &'static str,
        form: &[(&str, &str)],
    ) -> Result<ResultPayload, ClientError> {
        let url = format!("{}{}", self.backend_url, endpoint);
        let mut request = self.client.post(&url).form(form);
        if let Some(session_id) = self.session_id.as_deref() {
            request = request.header(COOKIE, Cookie::new(SESSION_COOKIE, session_id).to_string());
        }
        debug!(%url, "posting to case backend");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { endpoint, status });
        }
        Ok(response.json::<ResultPayload>().await?)
    }
}

impl CaseApi for HttpCaseApi {
    async fn mutate(&self, action: ItemAction, case_id: &str) -> Result<ResultPayload, ClientError> {
        self.post_form(action.endpoint(), &[("case_id", case_id)]).await
    }

    async fn query(&self, input: &str) -> Result<ResultPayload, ClientError> {
        self.post_form(QUERY_ENDPOINT, &[("inputData", input)]).await
    }

    async fn apply_weights(&self, weights: &[f64]) -> Result<ResultPayload, ClientError> {
        let joined = join_weights(weights);
        self.post_form(APPLY_WEIGHTS_ENDPOINT, &[("weights", joined.as_str())])
            .await
    }
}

pub fn join_weights(weights: &[f64]) -> String {
    weights
        .iter()
        .map(|weight| weight.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses the comma-joined slider values the page submits.
pub fn parse_weights(raw: &str) -> Option<Vec<f64>> {
    raw.split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect()
}
