//! Configuration snapshot and hot-swap store.
//!
//! Readers take a by-value copy of the snapshot per attempt; a reload
//! between attempts is therefore visible to the next attempt and invisible
//! to the running one. The credential pool is rebuilt (cursor reset)
//! whenever a new snapshot is published.

use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::translate::glossary::GlossaryProvider;
use crate::translate::keys::KeyPool;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a game text translator. Translate the incoming \
game text into Simplified Chinese, keeping tone, register, and punctuation faithful to the \
source. Output only the translation.";

/// Immutable configuration value. Field names mirror the persisted schema
/// (`api_address`, `api_key`, ...), so an existing INI converts key for key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upstream base URL, e.g. `https://api.openai.com/v1`.
    pub api_address: String,
    /// Comma-separated credential list.
    pub api_key: String,
    pub model_name: String,
    /// Listening port; 0 binds an ephemeral port.
    pub port: u16,
    pub system_prompt: String,
    /// Prefix prepended to the processed text as the current user turn.
    pub pre_prompt: String,
    /// Per-client history cap, in (user, assistant) pairs.
    pub context_num: usize,
    pub temperature: f64,
    /// Worker concurrency, clamped to >= 1 at server start.
    pub max_threads: usize,
    /// UI language index: 0 = English, 1 = Chinese.
    pub language: usize,
    pub enable_glossary: bool,
    pub glossary_path: String,
    /// Recently used glossary paths; persisted for the host UI.
    pub glossary_history: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_address: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model_name: "gpt-3.5-turbo".to_string(),
            port: 6800,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            pre_prompt: "将下面的文本翻译成简体中文：".to_string(),
            context_num: 5,
            temperature: 1.0,
            max_threads: 8,
            language: 1,
            enable_glossary: false,
            glossary_path: String::new(),
            glossary_history: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl GatewayConfig {
    /// Load the TOML config file. Absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Hot-swap store: the snapshot and the credential pool, each behind its
/// own lock. Both locks are held together only in [`update`](Self::update),
/// credential lock first; neither is ever held across I/O.
pub struct ConfigStore {
    keys: Mutex<KeyPool>,
    config: Mutex<GatewayConfig>,
}

impl ConfigStore {
    pub fn new(initial: GatewayConfig) -> Self {
        Self {
            keys: Mutex::new(KeyPool::from_credentials(&initial.api_key)),
            config: Mutex::new(initial),
        }
    }

    /// By-value snapshot; the only supported read.
    pub fn get(&self) -> GatewayConfig {
        self.config.lock().clone()
    }

    /// Publish a new snapshot: rebuild the credential pool (cursor back to
    /// 0), swap the config, then hand the glossary its new path once the
    /// locks are released.
    pub fn update(&self, new: GatewayConfig, glossary: &dyn GlossaryProvider) {
        {
            let mut keys = self.keys.lock();
            let mut config = self.config.lock();
            keys.rebuild(&new.api_key);
            *config = new.clone();
        }
        if new.enable_glossary {
            glossary.set_path(Path::new(&new.glossary_path));
        }
    }

    /// Round-robin credential for one attempt; `None` when the pool is
    /// empty.
    pub fn next_key(&self) -> Option<String> {
        self.keys.lock().next_key()
    }
}
