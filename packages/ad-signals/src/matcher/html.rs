//! HTML extraction helpers.
//!
//! `scraper::Html` is not `Send`, so everything is extracted into an owned
//! [`ParsedPage`] in one synchronous step and the DOM is dropped before any
//! caller awaits again.

use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::error::ParseError;

/// A hyperlink found in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Absolute URL when a base was given and the href resolved
    pub href: String,
    pub text: String,
}

/// A `<meta>` tag, keyed by its `name` or `property` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaTag {
    /// Lower-cased name or property
    pub key: String,
    pub content: String,
}

/// Owned extraction of the parts of a page the detectors inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedPage {
    /// Visible text, whitespace-collapsed, script and style bodies removed
    pub text: String,
    /// `src` of every external script, in document order
    pub scripts: Vec<String>,
    pub links: Vec<Link>,
    pub meta: Vec<MetaTag>,
}

impl ParsedPage {
    /// Parse a response body.
    ///
    /// Returns [`ParseError::NotHtml`] when a content type is given and is
    /// not an HTML/XHTML type, and [`ParseError::Empty`] for blank bodies.
    /// Malformed markup is not an error; the parser recovers as browsers do.
    pub fn parse(
        body: &str,
        content_type: Option<&str>,
        base: Option<&Url>,
    ) -> Result<Self, ParseError> {
        if let Some(content_type) = content_type {
            let lowered = content_type.to_ascii_lowercase();
            if !lowered.contains("html") {
                return Err(ParseError::NotHtml {
                    content_type: content_type.to_string(),
                });
            }
        }
        if body.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let document = Html::parse_document(body);
        Ok(Self {
            text: visible_text(&document),
            scripts: script_sources(&document),
            links: links(&document, base),
            meta: meta_tags(&document),
        })
    }

    /// Lower-cased visible text.
    pub fn text_lower(&self) -> String {
        self.text.to_lowercase()
    }
}

fn visible_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"))
                .unwrap_or(false)
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

fn script_sources(document: &Html) -> Vec<String> {
    let selector = match Selector::parse("script[src]") {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
        .collect()
}

fn links(document: &Html, base: Option<&Url>) -> Vec<Link> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with('#') {
                return None;
            }
            let href = match base {
                Some(base) => base.join(href).ok()?.to_string(),
                None => href.to_string(),
            };
            let text = el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            Some(Link { href, text })
        })
        .collect()
}

fn meta_tags(document: &Html) -> Vec<MetaTag> {
    let selector = match Selector::parse("meta") {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    document
        .select(&selector)
        .filter_map(|el| {
            let attrs = el.value();
            let key = attrs.attr("name").or_else(|| attrs.attr("property"))?;
            Some(MetaTag {
                key: key.trim().to_lowercase(),
                content: attrs.attr("content").unwrap_or("").trim().to_string(),
            })
        })
        .collect()
}

/// Host of a script `src`, resolving protocol-relative forms. Relative
/// sources have no host and return `None`.
pub fn script_host(src: &str) -> Option<String> {
    let absolute = if let Some(rest) = src.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        src.to_string()
    };
    Url::parse(&absolute)
        .ok()?
        .host_str()
        .map(|host| host.to_lowercase())
}
