//! Round-robin API credential pool. The pool is rebuilt from the raw
//! comma-separated credential string whenever a new configuration snapshot
//! is published; rebuilding resets the cursor.

/// Ordered credential sequence plus an advancing cursor. Locking lives in
/// the owning [`ConfigStore`](crate::config::ConfigStore).
#[derive(Debug, Default)]
pub struct KeyPool {
    keys: Vec<String>,
    cursor: usize,
}

impl KeyPool {
    /// Split on `,`, trim each entry, drop empties.
    pub fn from_credentials(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Self { keys, cursor: 0 }
    }

    /// Replace the pool contents and reset the cursor to 0.
    pub fn rebuild(&mut self, raw: &str) {
        *self = Self::from_credentials(raw);
    }

    /// Current credential, advancing the cursor modulo pool size.
    pub fn next_key(&mut self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.keys.len();
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn splits_trims_and_drops_empties() {
        let pool = KeyPool::from_credentials(" k1 , ,k2,, k3");
        assert_eq!(pool.len(), 3);
        let mut pool = pool;
        assert_eq!(pool.next_key().as_deref(), Some("k1"));
        assert_eq!(pool.next_key().as_deref(), Some("k2"));
        assert_eq!(pool.next_key().as_deref(), Some("k3"));
    }

    #[test]
    fn empty_pool_yields_none() {
        let mut pool = KeyPool::from_credentials("  , ,");
        assert!(pool.is_empty());
        assert_eq!(pool.next_key(), None);
    }

    #[test]
    fn rotation_is_fair_over_full_cycles() {
        let mut pool = KeyPool::from_credentials("a,b,c");
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..3 * 7 {
            *counts.entry(pool.next_key().unwrap()).or_default() += 1;
        }
        assert_eq!(counts["a"], 7);
        assert_eq!(counts["b"], 7);
        assert_eq!(counts["c"], 7);
    }

    #[test]
    fn rebuild_resets_cursor() {
        let mut pool = KeyPool::from_credentials("a,b,c");
        pool.next_key();
        pool.next_key();
        pool.rebuild("x,y");
        assert_eq!(pool.next_key().as_deref(), Some("x"));
        assert_eq!(pool.next_key().as_deref(), Some("y"));
        assert_eq!(pool.next_key().as_deref(), Some("x"));
    }
}
