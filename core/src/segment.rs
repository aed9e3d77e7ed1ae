//! Segment classification.
//!
//! Rules run top to bottom and the first match wins:
//!   1. Champions
//!   2. Loyal Customers
//!   3. Potential Loyalists
//!   4. At Risk
//!   5. Lost Customers (recency rule, or fallback for anything unmatched)
//!
//! Fallback hits are counted separately from the explicit Lost rule so a
//! threshold gap shows up in the run summary instead of disappearing into
//! the Lost bucket.

use crate::{
    aggregate::CustomerAggregate,
    config::{RuleThresholds, SegmentRules},
    rfm::{RfmScores, ScoredCustomer},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "Champions")]
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Potential Loyalists")]
    PotentialLoyalists,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Lost Customers")]
    LostCustomers,
}

impl Segment {
    /// Evaluation order.
    pub const ALL: [Segment; 5] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalists,
        Segment::AtRisk,
        Segment::LostCustomers,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions          => "Champions",
            Segment::LoyalCustomers     => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::AtRisk             => "At Risk",
            Segment::LostCustomers      => "Lost Customers",
        }
    }

    pub fn from_label(label: &str) -> Option<Segment> {
        Segment::ALL.into_iter().find(|s| s.label() == label)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub segment:      Segment,
    /// True when no explicit rule matched.
    pub via_fallback: bool,
}

fn rule_matches(rule: &RuleThresholds, scores: &RfmScores) -> bool {
    rule.recency.contains(scores.recency)
        && rule.frequency.contains(scores.frequency)
        && rule.monetary.contains(scores.monetary)
}

pub fn classify(scores: &RfmScores, rules: &SegmentRules) -> Classification {
    let explicit = [
        (Segment::Champions, &rules.champions),
        (Segment::LoyalCustomers, &rules.loyal_customers),
        (Segment::PotentialLoyalists, &rules.potential_loyalists),
        (Segment::AtRisk, &rules.at_risk),
    ];
    if let Some((segment, _)) = explicit.iter().find(|(_, rule)| rule_matches(rule, scores)) {
        return Classification { segment: *segment, via_fallback: false };
    }
    Classification {
        segment:      Segment::LostCustomers,
        via_fallback: !rules.lost_recency.contains(scores.recency),
    }
}

/// The published per-customer row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer: CustomerAggregate,
    pub scores:   RfmScores,
    pub rfm_code: String,
    pub segment:  Segment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub counts:   BTreeMap<Segment, usize>,
    /// Customers that reached Lost Customers only through the fallback.
    pub fallback: usize,
}

impl SegmentSummary {
    pub fn count(&self, segment: Segment) -> usize {
        self.counts.get(&segment).copied().unwrap_or(0)
    }
}

pub fn classify_all(
    scored: Vec<ScoredCustomer>,
    rules: &SegmentRules,
) -> (Vec<CustomerMetrics>, SegmentSummary) {
    let mut summary = SegmentSummary::default();
    let metrics: Vec<CustomerMetrics> = scored
        .into_iter()
        .map(|s| {
            let c = classify(&s.scores, rules);
            *summary.counts.entry(c.segment).or_default() += 1;
            if c.via_fallback {
                summary.fallback += 1;
                log::debug!(
                    "segment: customer {} ({}) matched no rule, assigned {}",
                    s.aggregate.customer_id,
                    s.scores,
                    c.segment
                );
            }
            CustomerMetrics {
                rfm_code: s.scores.code(),
                scores:   s.scores,
                segment:  c.segment,
                customer: s.aggregate,
            }
        })
        .collect();

    if summary.fallback > 0 {
        log::warn!(
            "segment: {} customers matched no explicit rule and fell back to {}",
            summary.fallback,
            Segment::LostCustomers
        );
    }
    log::info!("segment: {} customers classified", metrics.len());
    (metrics, summary)
}
