//! Rule-based pattern matching over page text and markup.
//!
//! A [`RuleSet`] is a list of named [`RuleGroup`]s. Each group holds a set
//! of patterns, a per-pattern weight and a cap:
//!
//! ```text
//! group score = min(distinct matching patterns × weight, cap)
//! total score = min(Σ group scores, 100)
//! ```
//!
//! Every pattern that fires is recorded as `"<group>: <pattern>"` in the
//! evidence list. Operators read this list to chase false positives, so it
//! names exactly what matched rather than summarizing.

pub mod html;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Upper bound of any matcher score.
pub const MAX_SCORE: u32 = 100;

#[derive(Debug, Clone)]
enum PatternKind {
    /// Lower-cased substring
    Literal(String),
    Regex(Regex),
}

/// One case-insensitive pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    label: String,
    kind: PatternKind,
}

impl Pattern {
    /// A plain substring pattern.
    pub fn literal(text: impl Into<String>) -> Self {
        let label = text.into();
        Self {
            kind: PatternKind::Literal(label.to_lowercase()),
            label,
        }
    }

    /// A regular expression pattern. Evidence shows the expression source.
    pub fn regex(expr: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(expr).case_insensitive(true).build()?;
        Ok(Self {
            label: expr.to_string(),
            kind: PatternKind::Regex(regex),
        })
    }

    /// Label used in evidence.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// `lowered` must be the lower-cased form of `original`.
    fn is_match(&self, original: &str, lowered: &str) -> bool {
        match &self.kind {
            PatternKind::Literal(needle) => lowered.contains(needle.as_str()),
            PatternKind::Regex(regex) => regex.is_match(original),
        }
    }
}

/// A named group of patterns sharing a weight and a cap.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub name: String,
    pub patterns: Vec<Pattern>,

    /// Points per distinct matching pattern
    pub weight: u32,

    /// Maximum points this group can contribute
    pub cap: u32,
}

impl RuleGroup {
    /// Create an empty group.
    pub fn new(name: impl Into<String>, weight: u32, cap: u32) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
            weight,
            cap,
        }
    }

    /// Add a pattern.
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Add several literal patterns.
    pub fn with_literals<I, S>(mut self, literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns
            .extend(literals.into_iter().map(Pattern::literal));
        self
    }

    /// Add several regex patterns.
    pub fn with_regexes<'a>(
        mut self,
        exprs: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, regex::Error> {
        for expr in exprs {
            self.patterns.push(Pattern::regex(expr)?);
        }
        Ok(self)
    }
}

/// An ordered list of rule groups.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub groups: Vec<RuleGroup>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group.
    pub fn with_group(mut self, group: RuleGroup) -> Self {
        self.groups.push(group);
        self
    }
}

/// Hits for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupHits {
    pub group: String,
    pub matched: Vec<String>,
    pub points: u32,
}

/// Result of evaluating a rule set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchOutcome {
    /// Bounded score (0-100)
    pub score: u32,

    /// `"<group>: <pattern>"` per hit, in rule order
    pub evidence: Vec<String>,

    /// Groups with at least one hit
    pub groups: Vec<GroupHits>,
}

impl MatchOutcome {
    /// Number of groups with at least one hit.
    pub fn groups_fired(&self) -> usize {
        self.groups.len()
    }

    /// Total number of distinct hits across groups.
    pub fn hit_count(&self) -> usize {
        self.groups.iter().map(|g| g.matched.len()).sum()
    }

    /// Record the hits for one group, applying weight and cap, and keep the
    /// running total within [`MAX_SCORE`]. Empty hit lists are ignored.
    pub fn record(&mut self, group: &str, matched: Vec<String>, weight: u32, cap: u32) {
        if matched.is_empty() {
            return;
        }
        let count = u32::try_from(matched.len()).unwrap_or(u32::MAX);
        let points = count.saturating_mul(weight).min(cap);
        self.evidence
            .extend(matched.iter().map(|hit| format!("{}: {}", group, hit)));
        self.score = self.score.saturating_add(points).min(MAX_SCORE);
        self.groups.push(GroupHits {
            group: group.to_string(),
            matched,
            points,
        });
    }
}

/// Evaluates a fixed rule set against text.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: RuleSet,
}

impl PatternMatcher {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Score `text` against every group.
    pub fn evaluate(&self, text: &str) -> MatchOutcome {
        let lowered = text.to_lowercase();
        let mut outcome = MatchOutcome::default();

        for group in &self.rules.groups {
            let mut matched: Vec<String> = Vec::new();
            for pattern in &group.patterns {
                if pattern.is_match(text, &lowered) && !matched.iter().any(|m| m == pattern.label()) {
                    matched.push(pattern.label().to_string());
                }
            }
            outcome.record(&group.name, matched, group.weight, group.cap);
        }

        outcome
    }
}
