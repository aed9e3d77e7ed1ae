use crate::error::{PipelineError, PipelineResult};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Cleaning ───────────────────────────────────────────────────────

/// Which fields make two lines "the same line" for de-duplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    /// invoice, product, customer, timestamp, quantity, unit price
    #[default]
    TransactionIdentity,
    /// transaction identity plus description and country. Lines that agree
    /// on the six identity fields but differ here are all retained.
    AllFields,
}

/// Inclusive calendar window; lines outside it are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end:   NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let day = ts.date();
        day >= self.start && day <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    #[default]
    Iqr,
    Zscore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierAction {
    /// Count outliers, drop nothing.
    #[default]
    Keep,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierPolicy {
    pub method:    OutlierMethod,
    pub action:    OutlierAction,
    /// IQR fence factor, or |z| limit for the z-score method. When unset
    /// the method's own default applies.
    pub threshold: Option<f64>,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self {
            method:    OutlierMethod::Iqr,
            action:    OutlierAction::Keep,
            threshold: None,
        }
    }
}

impl OutlierPolicy {
    pub fn effective_threshold(&self) -> f64 {
        self.threshold.unwrap_or(match self.method {
            OutlierMethod::Iqr => 1.5,
            OutlierMethod::Zscore => 3.0,
        })
    }
}

// ── Segmentation ───────────────────────────────────────────────────

/// Inclusive score range. `max: None` is unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: u8,
    #[serde(default)]
    pub max: Option<u8>,
}

impl ScoreRange {
    pub const fn at_least(min: u8) -> Self {
        Self { min, max: None }
    }

    pub const fn between(min: u8, max: u8) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn exactly(score: u8) -> Self {
        Self::between(score, score)
    }

    pub fn contains(&self, score: u8) -> bool {
        score >= self.min && self.max.map_or(true, |max| score <= max)
    }
}

/// One segment rule: all three dimensions must fall in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleThresholds {
    pub recency:   ScoreRange,
    pub frequency: ScoreRange,
    pub monetary:  ScoreRange,
}

impl RuleThresholds {
    pub const fn new(recency: ScoreRange, frequency: ScoreRange, monetary: ScoreRange) -> Self {
        Self { recency, frequency, monetary }
    }
}

/// Ordered segment rules. Evaluated top to bottom, first match wins;
/// anything unmatched lands in Lost Customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentRules {
    pub champions:           RuleThresholds,
    pub loyal_customers:     RuleThresholds,
    pub potential_loyalists: RuleThresholds,
    pub at_risk:             RuleThresholds,
    /// Recency scores that are Lost Customers outright.
    pub lost_recency:        ScoreRange,
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self {
            champions: RuleThresholds::new(
                ScoreRange::at_least(4),
                ScoreRange::at_least(4),
                ScoreRange::at_least(4),
            ),
            loyal_customers: RuleThresholds::new(
                ScoreRange::at_least(3),
                ScoreRange::at_least(3),
                ScoreRange::at_least(3),
            ),
            potential_loyalists: RuleThresholds::new(
                ScoreRange::at_least(3),
                ScoreRange::between(2, 3),
                ScoreRange::between(2, 3),
            ),
            at_risk: RuleThresholds::new(
                ScoreRange::between(2, 3),
                ScoreRange::at_least(2),
                ScoreRange::at_least(2),
            ),
            lost_recency: ScoreRange::exactly(1),
        }
    }
}

impl SegmentRules {
    fn named_ranges(&self) -> Vec<(String, ScoreRange)> {
        let mut out = Vec::with_capacity(13);
        for (name, rule) in [
            ("champions", &self.champions),
            ("loyal_customers", &self.loyal_customers),
            ("potential_loyalists", &self.potential_loyalists),
            ("at_risk", &self.at_risk),
        ] {
            out.push((format!("segment_rules.{name}.recency"), rule.recency));
            out.push((format!("segment_rules.{name}.frequency"), rule.frequency));
            out.push((format!("segment_rules.{name}.monetary"), rule.monetary));
        }
        out.push(("segment_rules.lost_recency".into(), self.lost_recency));
        out
    }
}

// ── Pipeline config ────────────────────────────────────────────────

pub const MIN_BIN_COUNT: u8 = 2;
/// RFM codes are one digit per dimension.
pub const MAX_BIN_COUNT: u8 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cancellation_prefix:      String,
    pub drop_missing_description: bool,
    pub dedup_key:                DedupKey,
    /// Lines priced above this are dropped. Off when `None`.
    pub max_unit_price:           Option<f64>,
    pub date_window:              Option<DateWindow>,
    pub outliers:                 OutlierPolicy,
    /// Reference date for recency. Defaults to the latest transaction.
    pub as_of:                    Option<NaiveDateTime>,
    pub bin_count:                u8,
    pub segment_rules:            SegmentRules,
    /// Number of partitions the aggregation fan-out is split into.
    pub partitions:               usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cancellation_prefix:      "C".into(),
            drop_missing_description: true,
            dedup_key:                DedupKey::default(),
            max_unit_price:           None,
            date_window:              None,
            outliers:                 OutlierPolicy::default(),
            as_of:                    None,
            bin_count:                5,
            segment_rules:            SegmentRules::default(),
            partitions:               1,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    /// The result is validated before it is returned.
    pub fn load(path: &str) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("config: loaded from {path}");
        Ok(config)
    }

    /// Reject semantically invalid options before any data is touched.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.cancellation_prefix.is_empty() {
            return Err(PipelineError::configuration(
                "cancellation_prefix",
                "must not be empty",
            ));
        }
        if !(MIN_BIN_COUNT..=MAX_BIN_COUNT).contains(&self.bin_count) {
            return Err(PipelineError::configuration(
                "bin_count",
                format!(
                    "must be within {MIN_BIN_COUNT}..={MAX_BIN_COUNT}, got {}",
                    self.bin_count
                ),
            ));
        }
        if self.partitions == 0 {
            return Err(PipelineError::configuration("partitions", "must be at least 1"));
        }
        if let Some(ceiling) = self.max_unit_price {
            if !ceiling.is_finite() || ceiling <= 0.0 {
                return Err(PipelineError::configuration(
                    "max_unit_price",
                    format!("must be a positive number, got {ceiling}"),
                ));
            }
        }
        if let Some(window) = self.date_window {
            if window.start > window.end {
                return Err(PipelineError::configuration(
                    "date_window",
                    format!("start {} is after end {}", window.start, window.end),
                ));
            }
        }
        let threshold = self.outliers.effective_threshold();
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(PipelineError::configuration(
                "outliers.threshold",
                format!("must be a positive number, got {threshold}"),
            ));
        }
        for (name, range) in self.segment_rules.named_ranges() {
            if range.min == 0 || range.min > self.bin_count {
                return Err(PipelineError::configuration(
                    name,
                    format!("min {} outside score scale 1..={}", range.min, self.bin_count),
                ));
            }
            if let Some(max) = range.max {
                if max < range.min {
                    return Err(PipelineError::configuration(
                        name,
                        format!("max {max} is below min {}", range.min),
                    ));
                }
            }
        }
        Ok(())
    }
}
