//! Translation pipeline — orchestrates the placeholder codec, glossary,
//! regex rules, context store, and upstream client behind the bounded
//! retry loop.
//!
//! Request lifecycle for one attempt: freeze → pre-regex → glossary inject
//! → upstream call → reconstruct → thaw → post-regex → validate → context
//! update. The configuration snapshot is re-read inside every attempt, so
//! a hot reload between attempts takes effect on the next try.

pub mod context;
pub mod freeze;
pub mod glossary;
pub mod keys;
pub mod reconstruct;
pub mod rules;
pub mod upstream;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ConfigStore;
use crate::events::{EventSink, GatewayEvent};
use crate::i18n;
use crate::metrics::{MetricsRegistry, Timing};
use crate::stop::StopSignal;
use context::ContextStore;
use freeze::EscapeCodec;
use glossary::GlossaryProvider;
use reconstruct::Reconstructor;
use rules::RegexProvider;
use upstream::{ChatClient, UpstreamError};

pub const MAX_ATTEMPTS: usize = 5;
pub const RETRY_BACKOFF: Duration = Duration::from_millis(1000);

/// Term extraction is only requested for sources longer than this many
/// characters.
const EXTRACTION_MIN_CHARS: usize = 5;

/// A usable attempt result: non-empty, not an upstream error echo, and not
/// a failure marker from the model.
pub fn is_valid_result(result: &str) -> bool {
    let lower = result.to_lowercase();
    !result.is_empty()
        && !lower.starts_with("error")
        && !result.contains("翻译失败")
        && !lower.contains("translation failed")
}

/// Orchestrates the full translation pipeline. Shared across workers; all
/// per-attempt state (escape map, snapshot, credential) is local to the
/// attempt.
pub struct TranslationService {
    config: Arc<ConfigStore>,
    contexts: ContextStore,
    codec: EscapeCodec,
    reconstructor: Reconstructor,
    client: ChatClient,
    glossary: Arc<dyn GlossaryProvider>,
    rules: Arc<dyn RegexProvider>,
    events: Arc<dyn EventSink>,
    metrics: Arc<MetricsRegistry>,
    stop: Arc<StopSignal>,
}

impl TranslationService {
    pub fn new(
        config: Arc<ConfigStore>,
        glossary: Arc<dyn GlossaryProvider>,
        rules: Arc<dyn RegexProvider>,
        events: Arc<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
        stop: Arc<StopSignal>,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            config,
            contexts: ContextStore::new(),
            codec: EscapeCodec::new(),
            reconstructor: Reconstructor::new(),
            client: ChatClient::new()?,
            glossary,
            rules,
            events,
            metrics,
            stop,
        })
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn stop_signal(&self) -> &Arc<StopSignal> {
        &self.stop
    }

    pub fn emit_log(&self, message: String) {
        self.events.emit(GatewayEvent::Log(message));
    }

    /// Publish a new configuration snapshot (hot reload).
    pub fn update_config(&self, new: crate::config::GatewayConfig) {
        self.config.update(new, self.glossary.as_ref());
    }

    /// Drop every client's conversational history.
    pub fn clear_contexts(&self) {
        self.contexts.clear_all();
        let lang = self.config.get().language;
        self.emit_log(i18n::text(i18n::CONTEXT_CLEARED, lang).to_string());
    }

    /// Full translation with retries. An empty result means the gateway
    /// gave up; the HTTP front maps it to a 500.
    pub async fn translate(&self, text: &str, client_ip: &str) -> String {
        let lang = self.config.get().language;
        let stop = self.stop.child();

        for attempt in 0..MAX_ATTEMPTS {
            if stop.is_cancelled() {
                self.emit_log(i18n::text(i18n::ABORTED, lang).to_string());
                return String::new();
            }

            if attempt > 0 {
                self.emit_log(i18n::interpolate(
                    i18n::text(i18n::RETRY_ATTEMPT, lang),
                    &[
                        ("attempt", (attempt + 1).to_string()),
                        ("max", MAX_ATTEMPTS.to_string()),
                    ],
                ));
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                    _ = stop.cancelled() => return String::new(),
                }
            }

            let result = self.attempt(text, client_ip, &stop).await;
            if stop.is_cancelled() {
                return String::new();
            }
            if is_valid_result(&result) {
                if attempt > 0 {
                    self.emit_log(i18n::text(i18n::RETRY_SUCCESS, lang).to_string());
                }
                return result;
            }
        }

        self.emit_log(i18n::text(i18n::RETRY_FAILED, lang).to_string());
        String::new()
    }

    /// One attempt against a fresh configuration snapshot.
    async fn attempt(&self, text: &str, client_ip: &str, stop: &CancellationToken) -> String {
        let cfg = self.config.get();
        let lang = cfg.language;

        let Some(api_key) = self.config.next_key() else {
            self.emit_log(format!("❌ {}", i18n::text(i18n::INVALID_KEY, lang)));
            return String::new();
        };

        let attempt_started = Instant::now();

        // Freeze structural fragments, then user pre-rules on the frozen text.
        let (frozen, escape_map) = self.codec.freeze(text);
        let processed = if cfg.enable_glossary {
            self.rules.process_pre(&frozen)
        } else {
            frozen
        };

        let client = context::client_id(client_ip);

        let mut glossary_block = String::new();
        let mut extract_terms = false;
        if cfg.enable_glossary {
            glossary_block = self.glossary.context_prompt(&processed);
            extract_terms = text.chars().count() > EXTRACTION_MIN_CHARS;
        }
        let system_prompt =
            upstream::build_system_prompt(&cfg.system_prompt, &glossary_block, extract_terms);

        let history = self.contexts.read(&client, cfg.context_num);
        let user_content = format!("{}{}", cfg.pre_prompt, processed);
        let payload = upstream::build_payload(
            &cfg.model_name,
            cfg.temperature,
            &system_prompt,
            &history,
            &user_content,
        );

        let upstream_started = Instant::now();
        let reply = self
            .client
            .send(&cfg.api_address, &api_key, &payload, stop)
            .await;
        self.metrics
            .observe(Timing::Upstream, upstream_started.elapsed());

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                self.log_upstream_error(&err, lang);
                self.metrics
                    .observe(Timing::Attempt, attempt_started.elapsed());
                return String::new();
            }
        };

        if let Some(usage) = reply.usage {
            if usage.prompt_tokens > 0 || usage.completion_tokens > 0 {
                self.metrics
                    .add_token_usage(usage.prompt_tokens, usage.completion_tokens);
                self.events.emit(GatewayEvent::TokenUsage {
                    prompt: usage.prompt_tokens,
                    completion: usage.completion_tokens,
                });
            }
        }

        let (rebuilt, terms) =
            self.reconstructor
                .reconstruct(&reply.content, extract_terms, &processed);
        for term in &terms {
            self.glossary.add_new_term(&term.source, &term.target);
            self.emit_log(format!(
                "{}{} = {}",
                i18n::text(i18n::NEW_TERM, lang),
                term.source,
                term.target
            ));
        }

        let thawed = self.codec.thaw(&rebuilt, &escape_map);
        let result = if cfg.enable_glossary {
            self.rules.process_post(&thawed)
        } else {
            thawed
        };

        self.emit_log(format!("  -> {result}"));
        self.metrics
            .observe(Timing::Attempt, attempt_started.elapsed());

        if !is_valid_result(&result) {
            debug!(raw = %reply.content, "attempt result rejected");
            return String::new();
        }
        if stop.is_cancelled() {
            return String::new();
        }
        self.contexts.append(&client, user_content, result.clone());
        result
    }

    fn log_upstream_error(&self, err: &UpstreamError, lang: usize) {
        let msg = match err {
            UpstreamError::InvalidKey => format!("❌ {}", i18n::text(i18n::INVALID_KEY, lang)),
            UpstreamError::Timeout => format!("❌ {}", i18n::text(i18n::REQUEST_TIMEOUT, lang)),
            UpstreamError::Network(detail) => format!(
                "❌ {}",
                i18n::interpolate(
                    i18n::text(i18n::NETWORK_ERROR, lang),
                    &[("error", detail.clone())],
                )
            ),
            UpstreamError::Format => format!("❌ {}", i18n::text(i18n::FORMAT_ERROR, lang)),
            UpstreamError::Parse(_) => format!("❌ {}", i18n::text(i18n::PARSE_ERROR, lang)),
            UpstreamError::Cancelled => i18n::text(i18n::ABORTED, lang).to_string(),
        };
        self.emit_log(msg);
    }
}
