//! User-defined regex substitutions applied around the LLM round-trip:
//! `pre` rules rewrite the frozen source text before it is sent, `post`
//! rules rewrite the thawed translation. The pipeline depends only on the
//! trait; the JSON-file-backed rule list is the default host
//! implementation.

use std::path::Path;

use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

/// Capability consumed by the translation pipeline.
pub trait RegexProvider: Send + Sync {
    fn process_pre(&self, text: &str) -> String;
    fn process_post(&self, text: &str) -> String;
}

/// Which side of the LLM call a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStage {
    Pre,
    Post,
}

#[derive(Debug)]
pub enum RuleError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleError::Io(e) => write!(f, "rule file IO error: {e}"),
            RuleError::Parse(e) => write!(f, "rule file parse error: {e}"),
        }
    }
}

impl From<std::io::Error> for RuleError {
    fn from(e: std::io::Error) -> Self {
        RuleError::Io(e)
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(e: serde_json::Error) -> Self {
        RuleError::Parse(e)
    }
}

/// On-disk format.
#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    pattern: String,
    replacement: String,
    stage: RuleStage,
}

struct CompiledRule {
    pattern: Regex,
    replacement: String,
    stage: RuleStage,
}

/// Ordered rule list. Rules apply in file order; invalid patterns are
/// skipped with a warning at load time.
pub struct RegexRules {
    rules: RwLock<Vec<CompiledRule>>,
}

impl RegexRules {
    pub fn empty() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        let file: RuleFile = serde_json::from_str(&content)?;
        let rules = Self::empty();
        rules.replace(file.rules);
        Ok(rules)
    }

    fn replace(&self, raw: Vec<RawRule>) {
        let mut compiled = Vec::with_capacity(raw.len());
        for rule in raw {
            match Regex::new(&rule.pattern) {
                Ok(pattern) => compiled.push(CompiledRule {
                    pattern,
                    replacement: rule.replacement,
                    stage: rule.stage,
                }),
                Err(e) => warn!(pattern = %rule.pattern, error = %e, "invalid rule pattern skipped"),
            }
        }
        *self.rules.write() = compiled;
    }

    /// Insert a single rule programmatically (used by hosts and tests).
    pub fn add_rule(&self, pattern: &str, replacement: &str, stage: RuleStage) -> Result<(), regex::Error> {
        let compiled = CompiledRule {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
            stage,
        };
        self.rules.write().push(compiled);
        Ok(())
    }

    fn apply(&self, text: &str, stage: RuleStage) -> String {
        let rules = self.rules.read();
        let mut out = text.to_string();
        for rule in rules.iter().filter(|r| r.stage == stage) {
            out = rule.pattern.replace_all(&out, rule.replacement.as_str()).into_owned();
        }
        out
    }
}

impl RegexProvider for RegexRules {
    fn process_pre(&self, text: &str) -> String {
        self.apply(text, RuleStage::Pre)
    }

    fn process_post(&self, text: &str) -> String {
        self.apply(text, RuleStage::Post)
    }
}
