//! Gateway observability: latency windows for the three request-path
//! timing points plus running token totals. Percentile summaries are
//! logged when the server stops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// How many recent samples each timing point keeps.
const WINDOW: usize = 1024;

/// Timing points on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Whole HTTP request, retries and backoff included.
    Request,
    /// One pipeline attempt.
    Attempt,
    /// One upstream chat call.
    Upstream,
}

impl Timing {
    const ALL: [Timing; 3] = [Timing::Request, Timing::Attempt, Timing::Upstream];

    pub fn name(self) -> &'static str {
        match self {
            Timing::Request => "request",
            Timing::Attempt => "attempt",
            Timing::Upstream => "upstream",
        }
    }
}

/// Sliding window over the most recent samples of one timing point,
/// stored in microseconds.
struct LatencyWindow {
    samples: VecDeque<u64>,
    window: usize,
}

impl LatencyWindow {
    fn new(window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(window),
            window,
        }
    }

    fn observe(&mut self, micros: u64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(micros);
    }

    /// Nearest-rank percentile over the window, in milliseconds.
    fn percentile_ms(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let idx = rank.saturating_sub(1).min(sorted.len() - 1);
        sorted[idx] as f64 / 1000.0
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Percentile snapshot of one timing point.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: usize,
}

/// Collects request-path latencies and token totals. Call sites measure
/// with [`std::time::Instant`] and hand the elapsed duration in.
pub struct MetricsRegistry {
    windows: [Mutex<LatencyWindow>; 3],
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            windows: [
                Mutex::new(LatencyWindow::new(WINDOW)),
                Mutex::new(LatencyWindow::new(WINDOW)),
                Mutex::new(LatencyWindow::new(WINDOW)),
            ],
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    fn window(&self, timing: Timing) -> &Mutex<LatencyWindow> {
        &self.windows[timing as usize]
    }

    /// Record one elapsed duration for a timing point.
    pub fn observe(&self, timing: Timing, elapsed: Duration) {
        let micros = elapsed.as_micros() as u64;
        self.window(timing).lock().observe(micros);
        tracing::trace!(point = timing.name(), elapsed_us = micros, "latency observed");
    }

    /// Accumulate upstream-reported token usage.
    pub fn add_token_usage(&self, prompt: u32, completion: u32) {
        self.prompt_tokens.fetch_add(prompt as u64, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion as u64, Ordering::Relaxed);
    }

    /// Running (prompt, completion) token totals.
    pub fn token_totals(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }

    /// Percentile for one timing point (p in 0-100), in milliseconds.
    pub fn percentile_ms(&self, timing: Timing, p: f64) -> f64 {
        self.window(timing).lock().percentile_ms(p)
    }

    /// Snapshot of every timing point that has samples.
    pub fn summary(&self) -> Vec<(&'static str, LatencySummary)> {
        Timing::ALL
            .iter()
            .filter_map(|&timing| {
                let window = self.window(timing).lock();
                if window.len() == 0 {
                    return None;
                }
                Some((
                    timing.name(),
                    LatencySummary {
                        p50_ms: window.percentile_ms(50.0),
                        p95_ms: window.percentile_ms(95.0),
                        p99_ms: window.percentile_ms(99.0),
                        count: window.len(),
                    },
                ))
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
