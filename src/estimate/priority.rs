//! Qualitative priority labels.
//!
//! The label is found by scaling the priority and re-testing it against the free-relay
//! bar. Tiers are tried in table order and the first passing one wins, so ties land on
//! the less scaled tier.

use std::fmt;

use serde::Serialize;

/// Priority classification, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PriorityLabel {
    /// Fails the bar even at 1000x.
    #[serde(rename = "lowest")]
    Lowest,
    /// Clears the bar at 1000x.
    #[serde(rename = "lower")]
    Lower,
    /// Clears the bar at 100x.
    #[serde(rename = "low")]
    Low,
    /// Clears the bar at 10x.
    #[serde(rename = "below medium")]
    BelowMedium,
    /// Clears the bar, but not at 1/1000.
    #[serde(rename = "medium")]
    Medium,
    /// Clears the bar at 1/1000.
    #[serde(rename = "above medium")]
    AboveMedium,
    /// Clears the bar at 1/10000.
    #[serde(rename = "high")]
    High,
    /// Clears the bar at 1/100000.
    #[serde(rename = "higher")]
    Higher,
    /// Clears the bar at 1/1000000.
    #[serde(rename = "highest")]
    Highest,
}

/// Divisors tried when the priority clears the bar.
const FREE_TIERS: [(f64, PriorityLabel); 4] = [
    (1_000_000.0, PriorityLabel::Highest),
    (100_000.0, PriorityLabel::Higher),
    (10_000.0, PriorityLabel::High),
    (1_000.0, PriorityLabel::AboveMedium),
];

/// Multipliers tried when it does not.
const PAID_TIERS: [(f64, PriorityLabel); 3] = [
    (10.0, PriorityLabel::BelowMedium),
    (100.0, PriorityLabel::Low),
    (1_000.0, PriorityLabel::Lower),
];

impl PriorityLabel {
    /// Classifies `priority` against a monotonic free-relay predicate.
    pub fn classify(priority: f64, allows_free: impl Fn(f64) -> bool) -> Self {
        if allows_free(priority) {
            FREE_TIERS
                .iter()
                .find(|(divisor, _)| allows_free(priority / divisor))
                .map_or(PriorityLabel::Medium, |(_, label)| *label)
        } else {
            PAID_TIERS
                .iter()
                .find(|(multiplier, _)| allows_free(priority * multiplier))
                .map_or(PriorityLabel::Lowest, |(_, label)| *label)
        }
    }

    /// Whether the label means the transaction clears the free-relay bar.
    pub fn is_free(&self) -> bool {
        *self >= PriorityLabel::Medium
    }
}

impl fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PriorityLabel::Lowest => "lowest",
            PriorityLabel::Lower => "lower",
            PriorityLabel::Low => "low",
            PriorityLabel::BelowMedium => "below medium",
            PriorityLabel::Medium => "medium",
            PriorityLabel::AboveMedium => "above medium",
            PriorityLabel::High => "high",
            PriorityLabel::Higher => "higher",
            PriorityLabel::Highest => "highest",
        };
        write!(f, "{label}")
    }
}
