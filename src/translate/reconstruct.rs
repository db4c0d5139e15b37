//! Rebuilds the final translation from the raw assistant content:
//! reasoning-noise removal, `<tm>` term harvesting, `<tl>` extraction.
//!
//! Every `<tm>key=value</tm>` span collapses to its translated side rather
//! than being deleted. A model that inlines the tag inside `<tl>` (e.g.
//! `<tl>Hello, <tm>Li=李</tm></tl>`) therefore still yields a well-formed
//! translation when `<tl>` is extracted afterwards.

use regex::Regex;

/// A term pair the model announced and the source text actually contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedTerm {
    pub source: String,
    pub target: String,
}

pub struct Reconstructor {
    think_re: Regex,
    tm_re: Regex,
    tl_re: Regex,
    tl_literal_re: Regex,
    token_re: Regex,
    term_code_re: Regex,
}

impl Reconstructor {
    pub fn new() -> Self {
        Self {
            think_re: Regex::new(r"(?s)<think>.*?</think>").unwrap(),
            tm_re: Regex::new(r"(?s)<tm>\s*(.*?)\s*=\s*(.*?)\s*</tm>").unwrap(),
            tl_re: Regex::new(r"(?s)<tl>(.*?)</tl>").unwrap(),
            tl_literal_re: Regex::new(r"(?i)</?tl>").unwrap(),
            token_re: Regex::new(r"\[T_\d+\]").unwrap(),
            term_code_re: Regex::new(r"Z[A-Z]{2}Z").unwrap(),
        }
    }

    /// Returns the reconstructed translation (still frozen, thaw comes
    /// after) and the terms to announce to the glossary. `processed_text`
    /// is the post-freeze source used for the containment guard.
    pub fn reconstruct(
        &self,
        raw: &str,
        extract_terms: bool,
        processed_text: &str,
    ) -> (String, Vec<HarvestedTerm>) {
        let cleaned = self.think_re.replace_all(raw, "").into_owned();

        let mut terms = Vec::new();
        let rebuilt = if extract_terms {
            let processed_lower = processed_text.to_lowercase();
            let mut buffer = String::with_capacity(cleaned.len());
            let mut last_end = 0;
            for caps in self.tm_re.captures_iter(&cleaned) {
                let whole = caps.get(0).unwrap();
                buffer.push_str(&cleaned[last_end..whole.start()]);

                let source = caps[1].trim().to_string();
                let target = caps[2].trim().to_string();
                if self.is_valid_term(&source, &target)
                    && processed_lower.contains(&source.to_lowercase())
                {
                    terms.push(HarvestedTerm { source, target: target.clone() });
                }

                // The span collapses to its translated side, valid or not.
                buffer.push_str(&target);
                last_end = whole.end();
            }
            buffer.push_str(&cleaned[last_end..]);
            buffer
        } else {
            cleaned
        };

        let extracted = match self.tl_re.captures(&rebuilt) {
            Some(caps) => caps[1].trim().to_string(),
            None => rebuilt.trim().to_string(),
        };
        let text = self.tl_literal_re.replace_all(&extracted, "").into_owned();
        (text, terms)
    }

    /// Both sides non-empty, neither carrying a `[T_n]` placeholder nor a
    /// `Z..Z` term code.
    fn is_valid_term(&self, source: &str, target: &str) -> bool {
        !source.is_empty()
            && !target.is_empty()
            && !self.token_re.is_match(source)
            && !self.token_re.is_match(target)
            && !self.term_code_re.is_match(source)
            && !self.term_code_re.is_match(target)
    }
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}
