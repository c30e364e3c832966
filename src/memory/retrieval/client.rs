//! Resilient client for the remote memory service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::memory::core::config::EffectiveConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::ingest::capture::AppendPayload;
use crate::memory::retrieval::search::SearchPayload;

/// Delay added per failed attempt before the next one.
pub const BACKOFF_STEP_MS: u64 = 100;

const ERROR_BODY_CHARS: usize = 500;

/// Boxed future type for transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One JSON POST against the memory service.
pub trait MemoryTransport: Send + Sync {
    /// Send `body` to `url` with the given credential.
    ///
    /// # Errors
    /// Returns an error on network failure, non-2xx status or a non-JSON body.
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        api_key: &'a str,
        body: &'a Value,
    ) -> TransportFuture<'a, MemoryResult<Value>>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the HTTP client.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn new() -> MemoryResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("memos-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl MemoryTransport for HttpTransport {
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        api_key: &'a str,
        body: &'a Value,
    ) -> TransportFuture<'a, MemoryResult<Value>> {
        Box::pin(async move {
            let auth = HeaderValue::from_str(&format!("Token {api_key}"))
                .map_err(|err| MemoryError::InvalidConfig(format!("api key: {err}")))?;

            let response = self
                .client
                .post(url)
                .header(AUTHORIZATION, auth)
                .header(CONTENT_TYPE, "application/json")
                .json(body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(MemoryError::Status {
                    status: status.as_u16(),
                    body: text.chars().take(ERROR_BODY_CHARS).collect(),
                });
            }

            serde_json::from_str(&text).map_err(|err| MemoryError::MalformedResponse(err.to_string()))
        })
    }
}

/// Remote endpoints exposed by the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endpoint {
    /// Recall search.
    Search,
    /// Capture append.
    Add,
}

impl Endpoint {
    fn url(self, config: &EffectiveConfig) -> String {
        match self {
            Self::Search => config.search_url(),
            Self::Add => config.add_url(),
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Add => "add",
        }
    }
}

/// Memory service client with timeout and bounded retry.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn MemoryTransport>,
}

impl ApiClient {
    /// Wrap a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn MemoryTransport>) -> Self {
        Self { transport }
    }

    /// Client over the real HTTP transport.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn http() -> MemoryResult<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Run a recall search.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub async fn search(
        &self,
        config: &EffectiveConfig,
        payload: &SearchPayload,
    ) -> MemoryResult<Value> {
        self.call_serialized(config, Endpoint::Search, payload).await
    }

    /// Append captured messages.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub async fn add(&self, config: &EffectiveConfig, payload: &AppendPayload) -> MemoryResult<Value> {
        self.call_serialized(config, Endpoint::Add, payload).await
    }

    async fn call_serialized<T: Serialize + Sync>(
        &self,
        config: &EffectiveConfig,
        endpoint: Endpoint,
        payload: &T,
    ) -> MemoryResult<Value> {
        let body = serde_json::to_value(payload)?;
        self.call(config, endpoint, &body).await
    }

    /// POST `body` to an endpoint.
    ///
    /// Makes `retries + 1` attempts at most, sleeping `attempt * 100ms`
    /// between them; each attempt is cut off after `timeoutMs`.
    ///
    /// # Errors
    /// Returns [`MemoryError::MissingCredential`] without any request when no
    /// API key is configured, otherwise the last attempt's error.
    pub async fn call(
        &self,
        config: &EffectiveConfig,
        endpoint: Endpoint,
        body: &Value,
    ) -> MemoryResult<Value> {
        let Some(api_key) = config.service.api_key.as_deref() else {
            return Err(MemoryError::MissingCredential);
        };

        let url = endpoint.url(config);
        let timeout_ms = config.service.timeout_ms;
        let max_attempts = config.service.retries.saturating_add(1);
        let mut attempt: u32 = 1;

        loop {
            let outcome = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.transport.post_json(&url, api_key, body),
            )
            .await
            .unwrap_or(Err(MemoryError::Timeout { timeout_ms }));

            match outcome {
                Ok(value) => {
                    debug!(endpoint = endpoint.as_str(), attempt, "Memory service call succeeded");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay_ms = u64::from(attempt) * BACKOFF_STEP_MS;
                    warn!(
                        endpoint = endpoint.as_str(),
                        attempt,
                        max_attempts,
                        delay_ms,
                        error = %err,
                        "Retrying memory service call"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use serde_json::json;

    /// Transport replaying scripted outcomes; `None` hangs forever.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Option<MemoryResult<Value>>>>,
        fallback_hang: bool,
        pub(crate) calls: AtomicUsize,
        pub(crate) bodies: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn replying(outcomes: Vec<MemoryResult<Value>>) -> Self {
            Self {
                script: Mutex::new(outcomes.into_iter().map(Some).collect()),
                ..Self::default()
            }
        }

        pub(crate) fn hanging() -> Self {
            Self {
                fallback_hang: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MemoryTransport for ScriptedTransport {
        fn post_json<'a>(
            &'a self,
            url: &'a str,
            _api_key: &'a str,
            body: &'a Value,
        ) -> TransportFuture<'a, MemoryResult<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            let next = self.script.lock().unwrap().pop_front();
            let hang = self.fallback_hang;
            Box::pin(async move {
                match next {
                    Some(Some(outcome)) => outcome,
                    Some(None) => std::future::pending().await,
                    None if hang => std::future::pending().await,
                    None => Err(MemoryError::Status {
                        status: 503,
                        body: "unavailable".to_string(),
                    }),
                }
            })
        }
    }

    fn config(retries: u32, timeout_ms: u64) -> EffectiveConfig {
        let mut config = EffectiveConfig::default();
        config.service.api_key = Some("key".to_string());
        config.service.retries = retries;
        config.service.timeout_ms = timeout_ms;
        config
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = ApiClient::new(transport.clone());
        let mut config = config(3, 1000);
        config.service.api_key = None;

        let err = client
            .call(&config, Endpoint::Search, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::MissingCredential));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_attempts_retries_plus_one() {
        for retries in 0..=3 {
            let transport = Arc::new(ScriptedTransport::default());
            let client = ApiClient::new(transport.clone());
            let err = client
                .call(&config(retries, 1000), Endpoint::Add, &json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, MemoryError::Status { status: 503, .. }));
            assert_eq!(transport.calls(), retries as usize + 1);
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let transport = Arc::new(ScriptedTransport::replying(vec![
            Err(MemoryError::Status {
                status: 500,
                body: String::new(),
            }),
            Ok(json!({ "code": 0 })),
        ]));
        let client = ApiClient::new(transport.clone());
        let value = client
            .call(&config(2, 1000), Endpoint::Search, &json!({ "q": 1 }))
            .await
            .unwrap();
        assert_eq!(value, json!({ "code": 0 }));
        assert_eq!(transport.calls(), 2);

        let bodies = transport.bodies.lock().unwrap();
        assert!(bodies[0].0.ends_with("/search/memory"));
        assert_eq!(bodies[0].1, json!({ "q": 1 }));
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::replying(vec![Err(
            MemoryError::MalformedResponse("eof".to_string()),
        )]));
        let client = ApiClient::new(transport.clone());
        let err = client
            .call(&config(3, 1000), Endpoint::Search, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::MalformedResponse(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_then_backoff() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let client = ApiClient::new(transport.clone());
        let started = Instant::now();

        let err = client
            .call(&config(1, 50), Endpoint::Search, &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, MemoryError::Timeout { timeout_ms: 50 }));
        assert_eq!(transport.calls(), 2);
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
