//! Normalized domain keys and the lexical forms derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized domain: lower-cased, scheme and `www.` stripped, no
/// trailing slash.
///
/// Two inputs that normalize to the same string are the same entity for the
/// whole pipeline (detectors, engine and batch de-duplication).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainKey(String);

impl DomainKey {
    /// Normalize raw input. Returns `None` when nothing is left.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = Self::normalize(input);
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Normalize a raw domain string.
    ///
    /// Applied until a fixpoint so that `normalize(normalize(d)) == normalize(d)`
    /// holds for inputs like `"http://http://x"` or `" www. x/"`.
    pub fn normalize(input: &str) -> String {
        let mut current = input.to_string();
        loop {
            let next = Self::normalize_once(&current);
            if next == current {
                return next;
            }
            current = next;
        }
    }

    fn normalize_once(input: &str) -> String {
        let lowered = input.trim().to_lowercase();
        let mut rest = lowered.as_str();
        for prefix in ["https://", "http://"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
                break;
            }
        }
        if let Some(stripped) = rest.strip_prefix("www.") {
            rest = stripped;
        }
        rest.trim_end_matches('/').to_string()
    }

    /// The normalized domain string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First dot-separated label (`"shop"` for `shop.example.com`).
    pub fn root(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Domain with its final label removed, dots kept (`"example"` for
    /// `example.com`, `"example.co"` for `example.co.uk`).
    pub fn without_tld(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) if idx > 0 => &self.0[..idx],
            _ => &self.0,
        }
    }

    /// Token that must appear in a library result for it to count as being
    /// about this domain. Very short roots are too ambiguous, so the full
    /// domain is used for them instead.
    pub fn domain_token(&self) -> &str {
        let root = self.root();
        if root.len() >= 3 {
            root
        } else {
            self.as_str()
        }
    }

    /// Search terms in order of specificity: the full domain, the domain
    /// without TLD and dots, the first label, and the punctuation-stripped
    /// form. Duplicates and empty terms are dropped.
    pub fn search_variants(&self) -> Vec<String> {
        let candidates = [
            self.0.clone(),
            self.without_tld().replace('.', ""),
            self.root().to_string(),
            self.0.replace(['-', '_'], ""),
        ];
        dedup_non_empty(candidates)
    }

    /// Forms accepted as proof that a scraped page belongs to this domain.
    pub fn identity_forms(&self) -> Vec<String> {
        let candidates = [
            self.0.clone(),
            self.without_tld().to_string(),
            self.root().to_string(),
        ];
        dedup_non_empty(candidates)
    }
}

fn dedup_non_empty(candidates: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
