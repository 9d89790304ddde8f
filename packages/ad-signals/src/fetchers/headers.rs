//! Browser-like header profiles.
//!
//! Rotation is a pure function of the URL and an attempt index, so two
//! concurrent detectors never share mutable user-agent state.

use sha2::{Digest, Sha256};

/// A coherent set of browser request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
    pub extra: &'static [(&'static str, &'static str)],
}

const NAVIGATION_HEADERS: &[(&str, &str)] = &[
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Cache-Control", "max-age=0"),
];

const PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        extra: NAVIGATION_HEADERS,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
        extra: NAVIGATION_HEADERS,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        extra: &[],
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "es-ES,es;q=0.9,en;q=0.8",
        extra: &[("Upgrade-Insecure-Requests", "1"), ("Pragma", "no-cache")],
    },
];

impl BrowserProfile {
    /// All available profiles.
    pub fn all() -> &'static [BrowserProfile] {
        PROFILES
    }

    /// Profile for a URL and attempt. Consecutive attempts walk the table
    /// starting from a URL-dependent offset.
    pub fn for_url(url: &str, attempt: usize) -> &'static BrowserProfile {
        let digest = Sha256::digest(url.as_bytes());
        let offset = digest[0] as usize;
        &PROFILES[(offset + attempt) % PROFILES.len()]
    }

    /// Header pairs. Accept-Encoding is left to the HTTP client so that it
    /// only advertises encodings it can decode.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.to_string()),
            ("Accept".to_string(), self.accept.to_string()),
            ("Accept-Language".to_string(), self.accept_language.to_string()),
        ];
        headers.extend(
            self.extra
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        headers
    }
}
