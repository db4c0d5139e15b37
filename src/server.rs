//! HTTP front: accepts the text-extraction tool's `GET /?text=…` requests
//! and dispatches them to the bounded worker pool. Start and stop are
//! idempotent; stop cancels in-flight attempts, drains the listener, and
//! joins the serve task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::events::GatewayEvent;
use crate::i18n;
use crate::metrics::Timing;
use crate::translate::TranslationService;

#[derive(Debug)]
pub enum ServerError {
    Bind(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(e) => write!(f, "bind failed: {e}"),
        }
    }
}

struct Running {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

struct FrontState {
    service: Arc<TranslationService>,
    workers: Arc<Semaphore>,
}

/// Owns the listening socket and the serve task.
pub struct GatewayServer {
    service: Arc<TranslationService>,
    running: Mutex<Option<Running>>,
}

impl GatewayServer {
    pub fn new(service: Arc<TranslationService>) -> Self {
        Self {
            service,
            running: Mutex::new(None),
        }
    }

    /// Bind `0.0.0.0:port` and serve. Returns the bound address; calling
    /// again while running returns the existing one.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if let Some(running) = self.running.lock().as_ref() {
            return Ok(running.addr);
        }

        let cfg = self.service.config().get();
        self.service.stop_signal().reset();
        let shutdown = self.service.stop_signal().child();

        let workers = cfg.max_threads.max(1);
        let state = Arc::new(FrontState {
            service: Arc::clone(&self.service),
            workers: Arc::new(Semaphore::new(workers)),
        });
        let app = Router::new()
            .route("/", get(handle_translate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
            .await
            .map_err(ServerError::Bind)?;
        let addr = listener.local_addr().map_err(ServerError::Bind)?;

        let handle = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
            if let Err(e) = served {
                warn!(error = %e, "server loop ended with error");
            }
        });

        *self.running.lock() = Some(Running { addr, handle });

        self.service.emit_log(i18n::interpolate(
            i18n::text(i18n::SERVER_STARTED, cfg.language),
            &[
                ("port", addr.port().to_string()),
                ("threads", workers.to_string()),
            ],
        ));
        Ok(addr)
    }

    /// Cancel in-flight work, close the listener, join the serve task.
    /// A second call is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        self.service.stop_signal().stop();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "server task join failed");
        }

        let cfg = self.service.config().get();
        self.service
            .emit_log(i18n::text(i18n::SERVER_STOPPED, cfg.language).to_string());

        let (prompt, completion) = self.service.metrics().token_totals();
        info!(prompt_tokens = prompt, completion_tokens = completion, "token usage totals");
        for (point, summary) in self.service.metrics().summary() {
            info!(
                point,
                p50_ms = summary.p50_ms,
                p95_ms = summary.p95_ms,
                p99_ms = summary.p99_ms,
                count = summary.count,
                "latency summary"
            );
        }
    }
}

async fn handle_translate(
    State(state): State<Arc<FrontState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(raw) = params.get("text") else {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            String::new(),
        );
    };
    let text = raw.trim().to_string();
    if text.is_empty() {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            String::new(),
        );
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("request", id = %request_id, peer = %peer.ip());

    async move {
        let service = &state.service;
        let cfg = service.config().get();

        // Worker-pool slot; holds until the response is built.
        let Ok(_permit) = state.workers.acquire().await else {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "Translation Failed".to_string(),
            );
        };

        service.emit_log(format!(
            "{}{}",
            i18n::text(i18n::REQUEST_RECEIVED, cfg.language),
            text.replace('\n', "[LF]")
        ));
        service.events().emit(GatewayEvent::WorkStarted);

        let started = Instant::now();
        let translated = service.translate(&text, &peer.ip().to_string()).await;
        service.metrics().observe(Timing::Request, started.elapsed());

        let success = !translated.is_empty() && !service.stop_signal().is_stopped();
        service.events().emit(GatewayEvent::WorkFinished { success });

        if translated.is_empty() {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "Translation Failed".to_string(),
            )
        } else {
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                translated,
            )
        }
    }
    .instrument(span)
    .await
}
