//! Check action player
//!
//! A [`Checker`] is bound to one simulated actor. It owns that actor's cookie
//! session and plays one described HTTP interaction per call, classifying the
//! outcome and delegating response verification to a pluggable callback.

use crate::cache::CacheSet;
use crate::config::HttpConfig;
use crate::errors::{CheckError, CheckResult};
use crate::types::HttpMethod;
use bytes::Bytes;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Pluggable response verification callback
///
/// Invoked with the fully buffered response; any error it returns propagates
/// as the played action's result.
pub type CheckFunc<'a> = Box<dyn FnOnce(&PlayedResponse) -> CheckResult<()> + Send + 'a>;

/// One described HTTP interaction
pub struct CheckAction<'a> {
    pub method: HttpMethod,
    pub path: String,

    /// Expected response status; `None` accepts any status
    pub expected_status: Option<StatusCode>,

    /// JSON request body
    pub post_json: Option<serde_json::Value>,

    /// What this action asserts, used in failure diagnostics
    pub description: &'static str,

    /// Response verification callback
    pub check: Option<CheckFunc<'a>>,

    /// Per-call timeout override; falls back to the configured default
    pub timeout: Option<Duration>,

    /// Conditional retrieval for static assets: send stored validators and
    /// accept 304 as equivalent to a full response
    pub enable_cache: bool,
}

impl<'a> Default for CheckAction<'a> {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            path: String::new(),
            expected_status: None,
            post_json: None,
            description: "",
            check: None,
            timeout: None,
            enable_cache: false,
        }
    }
}

/// A fully buffered response handed to verification callbacks
#[derive(Debug)]
pub struct PlayedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PlayedResponse {
    /// Decode the body as JSON; a malformed body is a fatal check failure
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> CheckResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| CheckError::Fatal(format!("failed to decode JSON response: {}", e)))
    }

    /// Body as UTF-8 text, lossily converted
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Per-actor action player with an isolated cookie session
#[derive(Debug, Clone)]
pub struct Checker {
    client: Client,
    base_url: Url,
    config: HttpConfig,
    cache: Arc<CacheSet>,
}

impl Checker {
    /// Create a player with a fresh cookie session
    pub fn new(base_url: Url, config: HttpConfig) -> CheckResult<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            client,
            base_url,
            config,
            cache: Arc::new(CacheSet::new()),
        })
    }

    /// Discard the cookie session, keeping cached validators
    ///
    /// Used before (re)login flows that must start unauthenticated.
    pub fn reset_session(&mut self) -> CheckResult<()> {
        self.client = build_client(&self.config)?;
        Ok(())
    }

    /// Play one described interaction and classify the outcome
    pub async fn play(&self, mut action: CheckAction<'_>) -> CheckResult<()> {
        let url = self
            .base_url
            .join(&action.path)
            .map_err(|source| CheckError::InvalidPath {
                path: action.path.clone(),
                source,
            })?;

        debug!("{} {} ({})", action.method, action.path, action.description);

        let mut request = self
            .client
            .request(action.method.into(), url)
            .timeout(action.timeout.unwrap_or(self.config.timeout));

        if let Some(body) = &action.post_json {
            request = request.json(body);
        }

        if action.enable_cache {
            if let Some(entry) = self.cache.get(&action.path) {
                if let Some(etag) = &entry.etag {
                    request = request.header(IF_NONE_MATCH, etag);
                }
                if let Some(last_modified) = &entry.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified);
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_network_error(action.method, &action.path, e))?;

        let status = response.status();
        let headers = response.headers().clone();

        // The body is always drained, even for 304s and status mismatches, so
        // the connection can be reused by the next action.
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_network_error(action.method, &action.path, e))?;

        let not_modified = action.enable_cache && status == StatusCode::NOT_MODIFIED;
        if action.enable_cache && status == StatusCode::OK {
            self.cache.store(&action.path, &headers);
        }

        if let Some(expected) = action.expected_status {
            if status != expected && !not_modified {
                return Err(CheckError::UnexpectedStatus {
                    method: action.method,
                    path: action.path,
                    description: action.description,
                    expected,
                    actual: status,
                });
            }
        }

        if let Some(check) = action.check.take() {
            let played = PlayedResponse {
                status,
                headers,
                body,
            };
            check(&played)?;
        }

        Ok(())
    }
}

fn build_client(config: &HttpConfig) -> CheckResult<Client> {
    Client::builder()
        .cookie_provider(Arc::new(Jar::default()))
        .user_agent(&config.user_agent)
        .danger_accept_invalid_certs(!config.verify_ssl)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(CheckError::ClientBuild)
}

fn classify_network_error(method: HttpMethod, path: &str, error: reqwest::Error) -> CheckError {
    if error.is_timeout() {
        CheckError::Timeout {
            method,
            path: path.to_string(),
        }
    } else {
        CheckError::Network {
            method,
            path: path.to_string(),
            source: error,
        }
    }
}
