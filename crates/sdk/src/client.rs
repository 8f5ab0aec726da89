//! Workflow client.
//!
//! A thin wrapper around a configured `reqwest::Client` that knows how to
//! reach the executor's event API and function registration endpoint. The
//! client also owns the client-level middleware applied to every function it
//! builds.

use std::{sync::Arc, time::Duration};

use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use stepwire_types::{FunctionOptions, MiddlewareHandle, SendEventsResult, SendPayload, Trigger};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    SDK_NAME, SDK_VERSION,
    error::SdkError,
    function::{FunctionHandler, FunctionManifest, WorkflowFunction},
};

/// Hostnames treated as local development targets regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];
/// Placeholder key accepted by a local development executor.
const DEV_EVENT_KEY: &str = "dev";

/// Whether the client talks to a local development executor or a hosted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    Dev,
    Cloud,
}

/// Construction options for [`WorkflowClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub id: String,
    pub event_key: Option<String>,
    pub signing_key: Option<String>,
    pub base_url: Url,
    pub mode: ClientMode,
    pub middleware: Vec<MiddlewareHandle>,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(id: impl Into<String>, base_url: Url, mode: ClientMode) -> Self {
        Self {
            id: id.into(),
            event_key: None,
            signing_key: None,
            base_url,
            mode,
            middleware: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Body posted to the registration endpoint when syncing functions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub url: String,
    pub app_name: String,
    pub framework: String,
    pub sdk: String,
    pub deploy_type: String,
    pub functions: Vec<FunctionManifest>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    ids: Vec<String>,
}

/// Handle to the workflow executor.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    options: Arc<ClientOptions>,
    http: Client,
    user_agent: String,
}

impl WorkflowClient {
    /// Build a client, validating the app id and base URL.
    pub fn new(options: ClientOptions) -> Result<Self, SdkError> {
        if options.id.trim().is_empty() {
            return Err(SdkError::invalid_client("client id cannot be empty"));
        }
        validate_base_url(&options.base_url, options.mode)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(options.timeout)
            .build()?;

        debug!(app_id = %options.id, base_url = %options.base_url, mode = ?options.mode, "workflow client created");
        Ok(Self {
            user_agent: format!("{SDK_NAME}/{SDK_VERSION}; {}", std::env::consts::OS),
            options: Arc::new(options),
            http,
        })
    }

    pub fn id(&self) -> &str {
        &self.options.id
    }

    pub fn mode(&self) -> ClientMode {
        self.options.mode
    }

    pub fn base_url(&self) -> &Url {
        &self.options.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn middleware(&self) -> &[MiddlewareHandle] {
        &self.options.middleware
    }

    /// Build a function object from options, a trigger and a handler.
    ///
    /// Client-level middleware runs before any function-level middleware.
    pub fn create_function(&self, options: FunctionOptions, trigger: Trigger, handler: FunctionHandler) -> Result<WorkflowFunction, SdkError> {
        WorkflowFunction::build(options, trigger, handler, &self.options.middleware)
    }

    /// Send one or more events to the executor.
    pub async fn send(&self, payload: impl Into<SendPayload>) -> Result<SendEventsResult, SdkError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Ok(SendEventsResult::default());
        }

        let url = self.event_url()?;
        let events = payload.into_events();
        let count = events.len();
        let response = self
            .http
            .post(url)
            .header(header::USER_AGENT, &self.user_agent)
            .json(&events)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), event_count = count, "event send rejected");
            return Err(SdkError::Send {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&body).unwrap_or(SendResponse { ids: Vec::new() });
        info!(event_count = count, "events sent");
        Ok(SendEventsResult { ids: parsed.ids })
    }

    /// Register the given function manifests with the executor.
    pub async fn sync(&self, request: &RegistrationRequest) -> Result<(), SdkError> {
        let url = self.options.base_url.join("fn/register")?;
        let mut builder = self
            .http
            .post(url)
            .header(header::USER_AGENT, &self.user_agent)
            .json(request);
        if let Some(signing_key) = self.options.signing_key.as_deref() {
            builder = builder.bearer_auth(signing_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Sync {
                status: status.as_u16(),
                body,
            });
        }
        info!(app_id = %self.options.id, function_count = request.functions.len(), "functions synced");
        Ok(())
    }

    /// URL of the event API for the configured key.
    pub fn event_url(&self) -> Result<Url, SdkError> {
        let key = match (self.options.event_key.as_deref(), self.options.mode) {
            (Some(key), _) if !key.trim().is_empty() => key,
            (_, ClientMode::Dev) => DEV_EVENT_KEY,
            (_, ClientMode::Cloud) => return Err(SdkError::MissingEventKey),
        };
        Ok(self.options.base_url.join(&format!("e/{key}"))?)
    }
}

/// Validate that a base URL is acceptable for the given mode.
///
/// Local hosts may use any http(s) scheme. Hosted executors must use https
/// when the client runs in cloud mode.
pub(crate) fn validate_base_url(url: &Url, mode: ClientMode) -> Result<(), SdkError> {
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(SdkError::invalid_base_url(
            url.as_str(),
            format!("unsupported scheme '{scheme}' (expected http/https)"),
        ));
    }

    let host = url
        .host_str()
        .ok_or_else(|| SdkError::invalid_base_url(url.as_str(), "URL must include a host"))?;

    if LOCALHOST_DOMAINS.iter().any(|&local| host.eq_ignore_ascii_case(local)) {
        return Ok(());
    }

    if mode == ClientMode::Cloud && scheme != "https" {
        return Err(SdkError::invalid_base_url(url.as_str(), "non-local hosts must use https in cloud mode"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwire_types::EventPayload;

    fn options(base: &str, mode: ClientMode) -> ClientOptions {
        ClientOptions::new("shop", Url::parse(base).unwrap(), mode)
    }

    #[test]
    fn rejects_empty_id() {
        let mut opts = options("http://localhost:8288", ClientMode::Dev);
        opts.id = "  ".into();
        assert!(matches!(WorkflowClient::new(opts), Err(SdkError::InvalidClient { .. })));
    }

    #[test]
    fn cloud_mode_requires_https_for_remote_hosts() {
        assert!(WorkflowClient::new(options("http://executor.example.com", ClientMode::Cloud)).is_err());
        assert!(WorkflowClient::new(options("https://executor.example.com", ClientMode::Cloud)).is_ok());
        assert!(WorkflowClient::new(options("http://localhost:8288", ClientMode::Cloud)).is_ok());
        assert!(WorkflowClient::new(options("http://executor.example.com", ClientMode::Dev)).is_ok());
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(WorkflowClient::new(options("ws://localhost:8288", ClientMode::Dev)).is_err());
    }

    #[test]
    fn event_url_uses_dev_placeholder_without_key() {
        let client = WorkflowClient::new(options("http://localhost:8288", ClientMode::Dev)).unwrap();
        assert_eq!(client.event_url().unwrap().as_str(), "http://localhost:8288/e/dev");
    }

    #[test]
    fn event_url_requires_key_in_cloud_mode() {
        let client = WorkflowClient::new(options("https://executor.example.com", ClientMode::Cloud)).unwrap();
        assert!(matches!(client.event_url(), Err(SdkError::MissingEventKey)));

        let mut opts = options("https://executor.example.com", ClientMode::Cloud);
        opts.event_key = Some("key-123".into());
        let client = WorkflowClient::new(opts).unwrap();
        assert_eq!(client.event_url().unwrap().as_str(), "https://executor.example.com/e/key-123");
    }

    #[tokio::test]
    async fn sending_empty_batch_skips_network() {
        let client = WorkflowClient::new(options("http://localhost:1", ClientMode::Dev)).unwrap();
        let result = client.send(Vec::<EventPayload>::new()).await.expect("empty send succeeds");
        assert!(result.ids.is_empty());
    }
}
