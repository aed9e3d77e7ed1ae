//! Validator/Cleaner: applies the business rules to parsed lines.
//!
//! RULE ORDER (fixed; only the audit counts depend on it):
//!   1.  cancelled invoices
//!   2.  missing customer
//!   3.  missing description        (configurable, on by default)
//!   4.  non-positive quantity, then non-positive or non-finite unit price
//!   4r. line revenue beyond `MAX_LINE_MINOR`
//!   4a. unit price ceiling         (configurable, off by default)
//!   4b. date window                (configurable, off by default)
//!   5.  duplicates, first instance kept
//!   6.  outliers                   (counted; dropped only under `remove`)
//!
//! The input slice is never mutated. Every dropped row is counted against
//! exactly one rule, the first one it fails.

use crate::{
    config::{DedupKey, OutlierAction, PipelineConfig},
    error::{PipelineError, PipelineResult},
    outlier,
    record::{RawLine, TransactionLine},
    types::{CustomerId, Money},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningRule {
    Cancelled,
    MissingCustomer,
    MissingDescription,
    NonPositiveQuantity,
    NonPositivePrice,
    RevenueOutOfRange,
    PriceAboveCeiling,
    OutsideDateWindow,
    Duplicate,
    Outlier,
}

impl CleaningRule {
    /// Stable name, used in logs and the persisted exclusion report.
    pub fn label(&self) -> &'static str {
        match self {
            CleaningRule::Cancelled           => "cancelled",
            CleaningRule::MissingCustomer     => "missing_customer",
            CleaningRule::MissingDescription  => "missing_description",
            CleaningRule::NonPositiveQuantity => "non_positive_quantity",
            CleaningRule::NonPositivePrice    => "non_positive_price",
            CleaningRule::RevenueOutOfRange   => "revenue_out_of_range",
            CleaningRule::PriceAboveCeiling   => "price_above_ceiling",
            CleaningRule::OutsideDateWindow   => "outside_date_window",
            CleaningRule::Duplicate           => "duplicate",
            CleaningRule::Outlier             => "outlier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCount {
    pub rule:    CleaningRule,
    pub removed: usize,
}

/// Per-run exclusion counts, in rule order. Counts only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionReport {
    pub input_rows:        usize,
    pub schema_violations: usize,
    pub rules:             Vec<RuleCount>,
    /// Outliers seen under the `keep` action (not removed).
    pub outliers_flagged:  usize,
    pub retained_rows:     usize,
}

impl ExclusionReport {
    pub fn removed_by(&self, rule: CleaningRule) -> usize {
        self.rules
            .iter()
            .filter(|c| c.rule == rule)
            .map(|c| c.removed)
            .sum()
    }

    pub fn total_removed(&self) -> usize {
        self.input_rows.saturating_sub(self.retained_rows)
    }

    /// Retained rows as a percentage of input rows.
    pub fn retention_rate(&self) -> f64 {
        if self.input_rows == 0 {
            return 0.0;
        }
        self.retained_rows as f64 / self.input_rows as f64 * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    pub lines:  Vec<TransactionLine>,
    pub report: ExclusionReport,
}

pub struct Cleaner<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Cleaner<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Parse then clean. Rows that do not fit the schema are dropped and
    /// counted as schema violations.
    pub fn clean_raw(&self, raw: &[RawLine]) -> CleaningOutcome {
        let mut parsed = Vec::with_capacity(raw.len());
        let mut violations = 0usize;

        for (row, line) in raw.iter().enumerate() {
            match line.parse(row) {
                Ok(parsed_line) => parsed.push(parsed_line),
                Err(violation) => {
                    violations += 1;
                    log::debug!("cleaning: schema violation, {violation}");
                }
            }
        }
        if violations > 0 {
            log::warn!("cleaning: {violations} rows dropped as schema violations");
        }

        let report = ExclusionReport {
            input_rows: raw.len(),
            schema_violations: violations,
            ..ExclusionReport::default()
        };
        self.run_rules(&parsed, report)
    }

    /// Clean already-typed lines. Running this on its own output drops
    /// nothing further (outlier action `keep`).
    pub fn clean(&self, lines: &[TransactionLine]) -> CleaningOutcome {
        let report = ExclusionReport {
            input_rows: lines.len(),
            ..ExclusionReport::default()
        };
        self.run_rules(lines, report)
    }

    fn run_rules(&self, lines: &[TransactionLine], mut report: ExclusionReport) -> CleaningOutcome {
        let mut kept: Vec<&TransactionLine> = lines.iter().collect();

        let prefix = self.config.cancellation_prefix.as_str();
        apply(&mut kept, &mut report, CleaningRule::Cancelled, |l| {
            !l.invoice_id.starts_with(prefix)
        });
        apply(&mut kept, &mut report, CleaningRule::MissingCustomer, |l| {
            l.customer_id.is_some()
        });
        if self.config.drop_missing_description {
            apply(&mut kept, &mut report, CleaningRule::MissingDescription, |l| {
                l.description.is_some()
            });
        }
        apply(&mut kept, &mut report, CleaningRule::NonPositiveQuantity, |l| l.quantity > 0);
        apply(&mut kept, &mut report, CleaningRule::NonPositivePrice, |l| {
            l.unit_price > 0.0 && l.unit_price.is_finite()
        });
        apply(&mut kept, &mut report, CleaningRule::RevenueOutOfRange, |l| {
            Money::line_total(l.quantity, l.unit_price).is_some()
        });
        if let Some(ceiling) = self.config.max_unit_price {
            apply(&mut kept, &mut report, CleaningRule::PriceAboveCeiling, |l| {
                l.unit_price <= ceiling
            });
        }
        if let Some(window) = self.config.date_window {
            apply(&mut kept, &mut report, CleaningRule::OutsideDateWindow, |l| {
                window.contains(l.timestamp)
            });
        }

        let dedup_key = self.config.dedup_key;
        let mut seen = HashSet::with_capacity(kept.len());
        apply(&mut kept, &mut report, CleaningRule::Duplicate, |l| {
            seen.insert(LineKey::of(l, dedup_key))
        });

        self.apply_outlier_policy(&mut kept, &mut report);

        report.retained_rows = kept.len();
        log::info!(
            "cleaning: {} rows in, {} retained ({:.2}%), {} schema violations",
            report.input_rows,
            report.retained_rows,
            report.retention_rate(),
            report.schema_violations,
        );

        CleaningOutcome {
            lines: kept.into_iter().cloned().collect(),
            report,
        }
    }

    fn apply_outlier_policy(&self, kept: &mut Vec<&TransactionLine>, report: &mut ExclusionReport) {
        let policy = self.config.outliers;
        let prices: Vec<f64> = kept.iter().map(|l| l.unit_price).collect();
        let quantities: Vec<f64> = kept.iter().map(|l| l.quantity as f64).collect();

        let (Some(price_fence), Some(quantity_fence)) = (
            outlier::fence(&prices, policy.method, policy.effective_threshold()),
            outlier::fence(&quantities, policy.method, policy.effective_threshold()),
        ) else {
            return;
        };
        let is_outlier = |l: &TransactionLine| {
            !price_fence.admits(l.unit_price) || !quantity_fence.admits(l.quantity as f64)
        };

        match policy.action {
            OutlierAction::Keep => {
                report.outliers_flagged = kept.iter().filter(|l| is_outlier(**l)).count();
                log::debug!("cleaning: {} outliers flagged, kept", report.outliers_flagged);
            }
            OutlierAction::Remove => {
                apply(kept, report, CleaningRule::Outlier, |l| !is_outlier(l));
            }
        }
    }
}

/// Retain lines passing `keep`, recording how many were dropped.
fn apply<'l>(
    kept: &mut Vec<&'l TransactionLine>,
    report: &mut ExclusionReport,
    rule: CleaningRule,
    mut keep: impl FnMut(&'l TransactionLine) -> bool,
) {
    let before = kept.len();
    kept.retain(|l| keep(*l));
    let removed = before - kept.len();
    report.rules.push(RuleCount { rule, removed });
    log::debug!(
        "cleaning: rule={} removed={removed} remaining={}",
        rule.label(),
        kept.len()
    );
}

/// Identity of a line for de-duplication. Under `DedupKey::AllFields`
/// description and country join the key, so lines that agree on the six
/// core fields but differ there are both retained.
#[derive(Debug, PartialEq, Eq, Hash)]
struct LineKey<'l> {
    invoice_id:   &'l str,
    product_code: &'l str,
    customer_id:  Option<CustomerId>,
    timestamp:    NaiveDateTime,
    quantity:     i64,
    price_bits:   u64,
    description:  Option<&'l str>,
    country:      Option<&'l str>,
}

impl<'l> LineKey<'l> {
    fn of(line: &'l TransactionLine, mode: DedupKey) -> Self {
        let all_fields = mode == DedupKey::AllFields;
        Self {
            invoice_id:   &line.invoice_id,
            product_code: &line.product_code,
            customer_id:  line.customer_id,
            timestamp:    line.timestamp,
            quantity:     line.quantity,
            price_bits:   line.unit_price.to_bits(),
            description:  if all_fields { line.description.as_deref() } else { None },
            country:      if all_fields { Some(line.country.as_str()) } else { None },
        }
    }
}

/// Re-check the post-cleaning invariants. A failure here means a cleaner
/// bug, so the run must stop rather than aggregate bad data.
pub fn check_integrity(lines: &[TransactionLine], config: &PipelineConfig) -> PipelineResult<()> {
    let mut seen = HashSet::with_capacity(lines.len());
    for line in lines {
        let reason = if line.quantity <= 0 {
            Some(format!("quantity must be positive, got {}", line.quantity))
        } else if line.unit_price <= 0.0 || !line.unit_price.is_finite() {
            Some(format!("unit price must be positive, got {}", line.unit_price))
        } else if Money::line_total(line.quantity, line.unit_price).is_none() {
            Some("line revenue outside the representable range".to_string())
        } else if line.customer_id.is_none() {
            Some("customer identifier missing".to_string())
        } else if line.invoice_id.starts_with(config.cancellation_prefix.as_str()) {
            Some(format!("invoice {} carries the cancellation marker", line.invoice_id))
        } else if !seen.insert(LineKey::of(line, config.dedup_key)) {
            Some("duplicate line survived cleaning".to_string())
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(PipelineError::integrity("cleaning", line.reference(), reason));
        }
    }
    Ok(())
}
