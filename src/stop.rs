//! Process-wide stop signal. Attempts and waits observe a child of the
//! current token; `stop` cancels every observer, `reset` installs a fresh
//! token so a stopped gateway can be started again.

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

pub struct StopSignal {
    token: RwLock<CancellationToken>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            token: RwLock::new(CancellationToken::new()),
        }
    }

    /// Child token observing the current stop generation.
    pub fn child(&self) -> CancellationToken {
        self.token.read().child_token()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.read().is_cancelled()
    }

    /// Cancel every observer of the current token.
    pub fn stop(&self) {
        self.token.read().cancel();
    }

    /// Install a fresh token. Observers of the previous one stay cancelled.
    pub fn reset(&self) {
        *self.token.write() = CancellationToken::new();
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
