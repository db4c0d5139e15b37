//! Event sink capability. The gateway emits typed events; the host decides
//! where they go (a desktop UI, plain logs, a test recorder).

use tracing::{debug, info};

/// Events the gateway emits while serving requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A localized, human-readable log line for the UI console.
    Log(String),
    /// A translation request entered the pipeline.
    WorkStarted,
    /// A translation request left the pipeline.
    WorkFinished { success: bool },
    /// Upstream reported nonzero token usage for one attempt.
    TokenUsage { prompt: u32, completion: u32 },
}

/// Narrow sink injected at construction; implementations must be cheap and
/// non-blocking, they are called from the request path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GatewayEvent);
}

/// Default sink: forwards everything to the tracing subscriber.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Log(msg) => info!(target: "tlgate::ui", "{msg}"),
            GatewayEvent::WorkStarted => debug!(target: "tlgate::ui", "work started"),
            GatewayEvent::WorkFinished { success } => {
                debug!(target: "tlgate::ui", success, "work finished")
            }
            GatewayEvent::TokenUsage { prompt, completion } => {
                debug!(target: "tlgate::ui", prompt, completion, "token usage")
            }
        }
    }
}
