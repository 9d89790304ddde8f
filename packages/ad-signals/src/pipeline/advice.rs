//! Operator-facing recommendation text per priority tier.

use crate::types::assessment::Priority;

/// One-line recommendation for a priority.
pub fn recommendation(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => {
            "Top priority: several independent signals confirm intense ad activity"
        }
        Priority::High => "High priority: solid evidence of ad activity",
        Priority::Medium => "Medium priority: mixed signals, verify with the official APIs",
        Priority::Low => "Low priority: little evidence of ad activity",
    }
}

/// Ordered follow-up actions for a priority.
pub fn next_steps(priority: Priority) -> Vec<String> {
    let steps: &[&str] = match priority {
        Priority::Critical => &[
            "Query the paid ad APIs now for exact figures",
            "Review the competitor's ad strategy in detail",
            "Plan competitive campaigns",
            "Monitor weekly",
        ],
        Priority::High => &[
            "Schedule paid API verification within the next few days",
            "Review ad formats and audiences",
            "Consider differentiation strategies",
            "Review monthly",
        ],
        Priority::Medium => &[
            "Verify with the paid APIs when budget allows",
            "Include in the quarterly competitor review",
            "Watch for significant changes",
            "Review every three months",
        ],
        Priority::Low => &[
            "No immediate action needed",
            "Review twice a year",
            "Include in the annual market review",
            "Focus resources on higher-priority domains",
        ],
    };
    steps.iter().map(|s| s.to_string()).collect()
}

/// Recommendation for an assessment whose evaluation failed.
pub const DEGRADED_RECOMMENDATION: &str =
    "Assessment failed: score forced to 0, re-run before prioritizing";
