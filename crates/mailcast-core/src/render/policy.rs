//! Keyword content policy
//!
//! A pre-send gate: rendered content containing any configured keyword
//! (case-insensitive substring) is flagged.

use serde::Serialize;

/// Result of a policy check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyVerdict {
    pub flagged: bool,
    pub matched_terms: Vec<String>,
}

impl PolicyVerdict {
    /// Human-readable skip reason
    pub fn reason(&self) -> String {
        format!("policy keywords matched: {}", self.matched_terms.join(", "))
    }
}

/// Keyword list, lowercased once
#[derive(Debug, Clone, Default)]
pub struct ContentPolicy {
    keywords: Vec<(String, String)>,
}

impl ContentPolicy {
    /// Blank keywords are dropped; they would match everything
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| {
                let lower = k.to_lowercase();
                (k, lower)
            })
            .collect();
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Check content; matched terms are reported as configured
    pub fn check(&self, content: &str) -> PolicyVerdict {
        if self.keywords.is_empty() || content.is_empty() {
            return PolicyVerdict::default();
        }

        let lower = content.to_lowercase();
        let matched_terms: Vec<String> = self
            .keywords
            .iter()
            .filter(|(_, needle)| lower.contains(needle.as_str()))
            .map(|(original, _)| original.clone())
            .collect();

        PolicyVerdict {
            flagged: !matched_terms.is_empty(),
            matched_terms,
        }
    }
}
