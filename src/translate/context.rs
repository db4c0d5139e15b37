//! Per-client conversational context. Each client keeps an ordered sequence
//! of (user turn, assistant turn) pairs bounded by the configured cap.
//! Entries are created lazily on first request and removed only by
//! [`ContextStore::clear_all`].

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// 8-hex fingerprint of the caller's IP (truncated md5). Distinct IPs may
/// collide; colliding clients then share conversational history.
pub fn client_id(ip: &str) -> String {
    let hex = format!("{:x}", md5::compute(ip.as_bytes()));
    hex[..8].to_string()
}

#[derive(Debug, Default)]
struct ClientHistory {
    turns: VecDeque<(String, String)>,
    cap: usize,
}

impl ClientHistory {
    fn trim(&mut self) {
        while self.turns.len() > self.cap {
            self.turns.pop_front();
        }
    }
}

/// Shared store of per-client turn pairs. One mutex guards the whole map;
/// it is held only for map access and copying, never across I/O.
#[derive(Default)]
pub struct ContextStore {
    inner: Mutex<HashMap<String, ClientHistory>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the client's history. Syncs the stored cap with `cap` and
    /// trims oldest entries from the front before returning.
    pub fn read(&self, client_id: &str, cap: usize) -> Vec<(String, String)> {
        let mut map = self.inner.lock();
        let entry = map.entry(client_id.to_string()).or_default();
        if entry.cap != cap {
            entry.cap = cap;
        }
        entry.trim();
        entry.turns.iter().cloned().collect()
    }

    /// Push a completed turn pair, then trim to the stored cap.
    pub fn append(&self, client_id: &str, user_turn: String, assistant_turn: String) {
        let mut map = self.inner.lock();
        let entry = map.entry(client_id.to_string()).or_default();
        entry.turns.push_back((user_turn, assistant_turn));
        entry.trim();
    }

    /// Drop every client's history.
    pub fn clear_all(&self) {
        self.inner.lock().clear();
    }

    #[cfg(test)]
    fn len_of(&self, client_id: &str) -> usize {
        self.inner
            .lock()
            .get(client_id)
            .map(|h| h.turns.len())
            .unwrap_or(0)
    }
}
