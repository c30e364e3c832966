//! Memory bridge orchestration.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::memory::core::config::{
    EffectiveConfig, merge_overrides, resolve_config, validate_overrides,
};
use crate::memory::core::env::EnvProvider;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::event::{LifecycleEvent, SessionContext};
use crate::memory::core::ids::ConversationResolver;
use crate::memory::ingest::capture::build_append_payload;
use crate::memory::ingest::heartbeat::{detect_heartbeat, diagnose};
use crate::memory::prompt::prompt_builder::{FormatOptions, PromptFormatter};
use crate::memory::prompt::records::RecallResult;
use crate::memory::retrieval::client::ApiClient;
use crate::memory::retrieval::search::{build_search_payload, recall_query_text};
use crate::memory::telemetry::stats::{EventDetails, StatKind, Telemetry};

/// Boxed future type for lifecycle hooks.
pub type HookFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Host lifecycle callbacks.
///
/// Implementations must never fail: every error is absorbed and logged.
pub trait LifecycleHooks: Send + Sync {
    /// A turn is starting; returns context to prepend, if any.
    fn on_turn_start<'a>(
        &'a self,
        event: &'a LifecycleEvent,
        ctx: &'a SessionContext,
    ) -> HookFuture<'a, Option<String>>;

    /// A turn has finished.
    fn on_turn_end<'a>(
        &'a self,
        event: &'a LifecycleEvent,
        ctx: &'a SessionContext,
    ) -> HookFuture<'a, ()>;

    /// The host started a new conversation in the session.
    ///
    /// Returns the session's new conversation counter.
    fn on_conversation_reset<'a>(&'a self, ctx: &'a SessionContext) -> HookFuture<'a, u64>;
}

/// What a capture attempt ended up doing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureOutcome {
    /// Messages were appended.
    Stored,
    /// Capture is turned off.
    Disabled,
    /// The turn was a heartbeat.
    Heartbeat,
    /// The host reported a failed turn.
    Unsuccessful,
    /// No message survived selection.
    Empty,
    /// A capture ran too recently.
    Throttled,
    /// The remote call failed.
    Failed,
}

/// Offline or live prompt preview request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewRequest {
    /// Raw search response to render.
    pub result: Option<Value>,
    /// Query to run live when no `result` is given.
    pub query: Option<String>,
    /// Session used for a live query.
    pub session_key: Option<String>,
    /// Template override.
    pub template: Option<String>,
    /// Compact style override.
    pub compact: Option<bool>,
    /// Timestamp override.
    pub include_timestamps: Option<bool>,
}

/// Rendered preview.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPreview {
    /// Prompt block; empty when nothing would be injected.
    pub prompt: String,
    /// Records in the response.
    pub memory_count: usize,
}

#[derive(Debug, Default)]
struct CredentialWarnings {
    search: AtomicBool,
    add: AtomicBool,
}

impl CredentialWarnings {
    fn warn_once(flag: &AtomicBool, site: &str) {
        if !flag.swap(true, Ordering::Relaxed) {
            warn!(site, "MEMOS_API_KEY is not configured; memory service calls are skipped");
        }
    }
}

/// Recall/capture pipeline between a host agent and the memory service.
pub struct MemoryBridge {
    plugin: Value,
    env: Arc<dyn EnvProvider>,
    config: RwLock<Arc<EffectiveConfig>>,
    client: ApiClient,
    resolver: ConversationResolver,
    formatter: PromptFormatter,
    telemetry: Arc<Telemetry>,
    last_capture: Mutex<Option<Instant>>,
    warnings: CredentialWarnings,
}

impl MemoryBridge {
    /// Create a bridge.
    ///
    /// The effective config is resolved from `plugin`, `env` and the
    /// overrides currently held by `telemetry`.
    ///
    /// # Errors
    /// Returns an error if the prompt formatter cannot be built.
    pub fn new(
        plugin: Value,
        env: Arc<dyn EnvProvider>,
        client: ApiClient,
        telemetry: Arc<Telemetry>,
    ) -> MemoryResult<Self> {
        let config = resolve_config(&plugin, env.as_ref(), &telemetry.overrides());
        info!(
            base_url = %config.service.base_url,
            user_id = %config.service.user_id,
            has_api_key = config.service.api_key.is_some(),
            recall = config.recall.enabled,
            capture = config.capture.enabled,
            "Memory bridge configured"
        );

        Ok(Self {
            plugin,
            env,
            config: RwLock::new(Arc::new(config)),
            client,
            resolver: ConversationResolver::new(),
            formatter: PromptFormatter::new()?,
            telemetry,
            last_capture: Mutex::new(None),
            warnings: CredentialWarnings::default(),
        })
    }

    /// Current effective config.
    #[must_use]
    pub fn config(&self) -> Arc<EffectiveConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Shared telemetry.
    #[must_use]
    pub const fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Conversation id resolver.
    #[must_use]
    pub const fn resolver(&self) -> &ConversationResolver {
        &self.resolver
    }

    /// Recall memories for a starting turn.
    ///
    /// Returns the prompt block to prepend, or `None` when recall is off, the
    /// turn is a heartbeat, nothing was found, or the service failed.
    pub async fn recall(&self, event: &LifecycleEvent, ctx: &SessionContext) -> Option<String> {
        let config = self.config();
        if !config.recall.enabled {
            return None;
        }

        if let Some(signal) = detect_heartbeat(event, ctx, &config.heartbeat) {
            debug!(?signal, "Skipping recall for heartbeat turn");
            self.record_heartbeat(event, ctx, &config, "recall");
            return None;
        }

        let Some(query) = recall_query_text(event) else {
            debug!("No query text for recall");
            return None;
        };

        let payload = build_search_payload(&config, &self.resolver, &query, ctx);
        let request = serde_json::to_value(&payload).unwrap_or(Value::Null);
        let started = Instant::now();
        let outcome = self.client.search(&config, &payload).await;
        let duration_ms = elapsed_ms(started);

        match outcome {
            Ok(raw) => {
                let result = RecallResult::from_response(&raw);
                let count = result.as_ref().map_or(0, RecallResult::len);
                let block = result
                    .map(|r| self.formatter.format_result(&r, &FormatOptions::from(&config.prompt)))
                    .unwrap_or_default();
                self.telemetry.record(
                    StatKind::Search,
                    EventDetails::new(&query)
                        .with_duration(duration_ms)
                        .with_debug(json!({ "request": request, "memoryCount": count })),
                );
                info!(count, duration_ms, injected = !block.is_empty(), "Recall completed");
                (!block.is_empty()).then_some(block)
            }
            Err(MemoryError::MalformedResponse(reason)) => {
                warn!(%reason, "Recall response was not usable");
                self.telemetry.record(
                    StatKind::Search,
                    EventDetails::new(&query)
                        .with_duration(duration_ms)
                        .with_debug(json!({ "request": request, "malformed": reason })),
                );
                None
            }
            Err(err) => {
                if matches!(err, MemoryError::MissingCredential) {
                    CredentialWarnings::warn_once(&self.warnings.search, "recall");
                } else {
                    warn!(error = %err, duration_ms, "Recall failed");
                }
                self.telemetry.record(
                    StatKind::SearchError,
                    EventDetails::new(&query)
                        .with_duration(duration_ms)
                        .with_error(err.to_string())
                        .with_debug(json!({ "request": request })),
                );
                None
            }
        }
    }

    /// Capture a finished turn.
    pub async fn capture(&self, event: &LifecycleEvent, ctx: &SessionContext) -> CaptureOutcome {
        let config = self.config();
        if !config.capture.enabled {
            return CaptureOutcome::Disabled;
        }

        if let Some(signal) = detect_heartbeat(event, ctx, &config.heartbeat) {
            debug!(?signal, "Skipping capture for heartbeat turn");
            self.record_heartbeat(event, ctx, &config, "capture");
            return CaptureOutcome::Heartbeat;
        }

        if event.success == Some(false) {
            debug!("Skipping capture for unsuccessful turn");
            return CaptureOutcome::Unsuccessful;
        }

        let Some(payload) = build_append_payload(&config, &self.resolver, event, ctx) else {
            debug!("No messages selected for capture");
            return CaptureOutcome::Empty;
        };

        if !self.claim_capture_slot(config.capture.throttle_ms) {
            self.telemetry.record(
                StatKind::Skip,
                EventDetails::new("capture throttled")
                    .with_debug(json!({ "throttleMs": config.capture.throttle_ms })),
            );
            return CaptureOutcome::Throttled;
        }

        let preview = payload
            .messages
            .first()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let request = serde_json::to_value(&payload).unwrap_or(Value::Null);
        let started = Instant::now();
        let outcome = self.client.add(&config, &payload).await;
        let duration_ms = elapsed_ms(started);

        match outcome {
            Ok(_) => {
                self.telemetry.record(
                    StatKind::Add,
                    EventDetails::new(preview)
                        .with_duration(duration_ms)
                        .with_debug(json!({ "request": request })),
                );
                info!(
                    messages = payload.messages.len(),
                    conversation_id = %payload.conversation_id,
                    duration_ms,
                    "Capture completed"
                );
                CaptureOutcome::Stored
            }
            Err(err) => {
                if matches!(err, MemoryError::MissingCredential) {
                    CredentialWarnings::warn_once(&self.warnings.add, "capture");
                } else {
                    warn!(error = %err, duration_ms, "Capture failed");
                }
                self.telemetry.record(
                    StatKind::AddError,
                    EventDetails::new(preview)
                        .with_duration(duration_ms)
                        .with_error(err.to_string())
                        .with_debug(json!({ "request": request })),
                );
                CaptureOutcome::Failed
            }
        }
    }

    /// Start a new conversation for the session.
    pub fn start_new_conversation(&self, ctx: &SessionContext) -> u64 {
        let count = self.resolver.start_new_conversation(ctx);
        info!(
            session = ctx.session_key.as_deref().unwrap_or("default"),
            count,
            "Started new conversation"
        );
        count
    }

    /// Validate, merge and persist dashboard overrides, then rebuild config.
    ///
    /// # Errors
    /// Returns [`MemoryError::Validation`] without touching any state when an
    /// update value is outside its documented range.
    pub async fn apply_overrides(
        &self,
        update: &Map<String, Value>,
    ) -> MemoryResult<Arc<EffectiveConfig>> {
        let errors = validate_overrides(update);
        if !errors.is_empty() {
            return Err(MemoryError::Validation(errors));
        }

        let config = self.telemetry.update_overrides(|overrides| {
            *overrides = merge_overrides(overrides, update);
            self.rebuild(overrides)
        });
        self.telemetry.flush().await;
        info!(keys = update.len(), "Applied config overrides");
        Ok(config)
    }

    /// Drop every override and rebuild config.
    pub async fn clear_overrides(&self) -> Arc<EffectiveConfig> {
        let config = self.telemetry.update_overrides(|overrides| {
            overrides.clear();
            self.rebuild(overrides)
        });
        self.telemetry.flush().await;
        info!("Cleared config overrides");
        config
    }

    /// Render a prompt preview without touching telemetry.
    ///
    /// # Errors
    /// Returns an error if a live query fails.
    pub async fn preview_prompt(&self, request: &PreviewRequest) -> MemoryResult<PromptPreview> {
        let config = self.config();
        let mut options = FormatOptions::from(&config.prompt);
        if let Some(template) = &request.template {
            options.template = Some(template.clone());
        }
        if let Some(compact) = request.compact {
            options.compact = compact;
        }
        if let Some(include_timestamps) = request.include_timestamps {
            options.include_timestamps = include_timestamps;
        }

        let raw = match (&request.result, request.query.as_deref()) {
            (Some(raw), _) => raw.clone(),
            (None, Some(query)) if !query.trim().is_empty() => {
                let ctx = request
                    .session_key
                    .as_deref()
                    .map(SessionContext::for_session)
                    .unwrap_or_default();
                let payload = build_search_payload(&config, &self.resolver, query.trim(), &ctx);
                self.client.search(&config, &payload).await?
            }
            _ => {
                return Err(MemoryError::InvalidConfig(
                    "preview needs a result or a query".to_string(),
                ));
            }
        };

        let result = RecallResult::from_response(&raw).unwrap_or_default();
        Ok(PromptPreview {
            prompt: self.formatter.format_result(&result, &options),
            memory_count: result.len(),
        })
    }

    fn rebuild(&self, overrides: &Map<String, Value>) -> Arc<EffectiveConfig> {
        let config = Arc::new(resolve_config(&self.plugin, self.env.as_ref(), overrides));
        let mut slot = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::clone(&config);
        config
    }

    fn record_heartbeat(
        &self,
        event: &LifecycleEvent,
        ctx: &SessionContext,
        config: &EffectiveConfig,
        stage: &str,
    ) {
        let diagnostics = serde_json::to_value(diagnose(event, ctx, &config.heartbeat))
            .unwrap_or(Value::Null);
        self.telemetry.record(
            StatKind::Heartbeat,
            EventDetails::new(format!("{stage} skipped"))
                .with_debug(json!({ "stage": stage, "diagnostics": diagnostics })),
        );
    }

    /// Process-wide capture rate limit; stamps the slot when granted.
    fn claim_capture_slot(&self, throttle_ms: u64) -> bool {
        let mut last = self
            .last_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if throttle_ms > 0
            && let Some(previous) = *last
            && now.duration_since(previous) < Duration::from_millis(throttle_ms)
        {
            return false;
        }
        *last = Some(now);
        true
    }
}

impl LifecycleHooks for MemoryBridge {
    fn on_turn_start<'a>(
        &'a self,
        event: &'a LifecycleEvent,
        ctx: &'a SessionContext,
    ) -> HookFuture<'a, Option<String>> {
        Box::pin(self.recall(event, ctx))
    }

    fn on_turn_end<'a>(
        &'a self,
        event: &'a LifecycleEvent,
        ctx: &'a SessionContext,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            let outcome = self.capture(event, ctx).await;
            debug!(?outcome, "Turn end handled");
        })
    }

    fn on_conversation_reset<'a>(&'a self, ctx: &'a SessionContext) -> HookFuture<'a, u64> {
        Box::pin(async move { self.start_new_conversation(ctx) })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
