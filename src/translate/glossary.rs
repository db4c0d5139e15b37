//! Glossary capability: relevant-term prompt context plus appends for terms
//! the model discovers. The pipeline depends only on the trait; the
//! JSON-file-backed store is the default host implementation.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One term pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
}

/// Capability consumed by the translation pipeline. Implementations must be
/// thread safe; they are called concurrently from worker tasks.
pub trait GlossaryProvider: Send + Sync {
    /// Point the provider at a different glossary file.
    fn set_path(&self, path: &Path);

    /// Prompt block covering terms present in `processed_text`; empty when
    /// nothing matches.
    fn context_prompt(&self, processed_text: &str) -> String;

    /// Append a newly discovered term. Duplicate sources are ignored.
    fn add_new_term(&self, source: &str, target: &str);
}

#[derive(Debug)]
pub enum GlossaryError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for GlossaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlossaryError::Io(e) => write!(f, "glossary IO error: {e}"),
            GlossaryError::Parse(e) => write!(f, "glossary parse error: {e}"),
        }
    }
}

impl From<std::io::Error> for GlossaryError {
    fn from(e: std::io::Error) -> Self {
        GlossaryError::Io(e)
    }
}

impl From<serde_json::Error> for GlossaryError {
    fn from(e: serde_json::Error) -> Self {
        GlossaryError::Parse(e)
    }
}

/// On-disk format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct GlossaryFile {
    version: u32,
    entries: Vec<GlossaryEntry>,
}

struct GlossaryState {
    path: Option<PathBuf>,
    version: u32,
    entries: Vec<GlossaryEntry>,
}

/// JSON-file-backed glossary. A missing or unreadable file degrades to an
/// empty glossary with a warning; appends are written back immediately.
pub struct FileGlossary {
    state: Mutex<GlossaryState>,
}

impl FileGlossary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GlossaryState {
                path: None,
                version: 0,
                entries: Vec::new(),
            }),
        }
    }

    fn load(path: &Path) -> Result<GlossaryFile, GlossaryError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(state: &GlossaryState) {
        let Some(path) = &state.path else { return };
        let file = GlossaryFile {
            version: state.version,
            entries: state.entries.clone(),
        };
        match serde_json::to_string_pretty(&file) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(error = %e, path = %path.display(), "glossary save failed");
                }
            }
            Err(e) => warn!(error = %e, "glossary serialize failed"),
        }
    }

    /// Snapshot of the current entries, oldest first.
    pub fn entries(&self) -> Vec<GlossaryEntry> {
        self.state.lock().entries.clone()
    }
}

impl Default for FileGlossary {
    fn default() -> Self {
        Self::new()
    }
}

impl GlossaryProvider for FileGlossary {
    fn set_path(&self, path: &Path) {
        let loaded = Self::load(path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "glossary load failed, using empty");
            GlossaryFile::default()
        });
        let mut state = self.state.lock();
        state.path = Some(path.to_path_buf());
        state.version = loaded.version;
        state.entries = loaded.entries;
        debug!(count = state.entries.len(), "glossary loaded");
    }

    fn context_prompt(&self, processed_text: &str) -> String {
        let state = self.state.lock();
        let text_lower = processed_text.to_lowercase();
        let matched: Vec<&GlossaryEntry> = state
            .entries
            .iter()
            .filter(|e| !e.source.is_empty() && text_lower.contains(&e.source.to_lowercase()))
            .collect();
        if matched.is_empty() {
            return String::new();
        }
        let mut block = String::from("【Glossary】Use these fixed translations:\n");
        for entry in matched {
            block.push_str(&entry.source);
            block.push_str(" = ");
            block.push_str(&entry.target);
            block.push('\n');
        }
        block
    }

    fn add_new_term(&self, source: &str, target: &str) {
        let mut state = self.state.lock();
        let source_lower = source.to_lowercase();
        if state.entries.iter().any(|e| e.source.to_lowercase() == source_lower) {
            return;
        }
        state.entries.push(GlossaryEntry {
            source: source.to_string(),
            target: target.to_string(),
        });
        Self::save(&state);
    }
}
