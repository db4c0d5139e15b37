//! tlgate: a local HTTP gateway that fronts an OpenAI-style
//! chat-completions API for game text-extraction tools.
//!
//! The extraction tool issues `GET /?text=…`; the gateway freezes
//! structural markup into `[T_n]` placeholders, injects glossary context,
//! calls the upstream model, reconstructs the `<tl>`/`<tm>` response,
//! thaws the placeholders, applies post-regex rules, and maintains
//! per-client conversational context. Credentials rotate round-robin,
//! failed attempts retry with backoff, and the configuration hot-reloads
//! without dropping in-flight requests.

pub mod config;
pub mod events;
pub mod i18n;
pub mod metrics;
pub mod server;
pub mod stop;
pub mod translate;

pub use config::{ConfigStore, GatewayConfig};
pub use events::{EventSink, GatewayEvent, TracingSink};
pub use metrics::MetricsRegistry;
pub use server::GatewayServer;
pub use stop::StopSignal;
pub use translate::TranslationService;
