//! Feature derivation: line revenue and calendar decomposition.
//!
//! `enrich` is a pure function of one cleaned line, so lines can be
//! enriched in any order or in parallel.

use crate::{
    error::{PipelineError, PipelineResult},
    record::TransactionLine,
    types::{CustomerId, Money},
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar month bucket, displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year:  i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(ts: NaiveDateTime) -> Self {
        Self {
            year:  ts.year(),
            month: ts.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub year:       i32,
    pub month:      u32,
    pub day:        u32,
    pub hour:       u32,
    /// Monday = 0 … Sunday = 6
    pub weekday:    u32,
    pub year_month: YearMonth,
}

impl Calendar {
    pub fn of(ts: NaiveDateTime) -> Self {
        Self {
            year:       ts.year(),
            month:      ts.month(),
            day:        ts.day(),
            hour:       ts.hour(),
            weekday:    ts.weekday().num_days_from_monday(),
            year_month: YearMonth::of(ts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLine {
    pub line:        TransactionLine,
    /// Copied out of `line` once cleaning has guaranteed it is present.
    pub customer_id: CustomerId,
    pub revenue:     Money,
    pub calendar:    Calendar,
}

/// Derive revenue and calendar parts for one cleaned line.
pub fn enrich(line: TransactionLine) -> PipelineResult<EnrichedLine> {
    let customer_id = line.customer_id.ok_or_else(|| {
        PipelineError::integrity(
            "feature_derivation",
            line.reference(),
            "customer identifier missing",
        )
    })?;
    let revenue = Money::line_total(line.quantity, line.unit_price).ok_or_else(|| {
        PipelineError::integrity(
            "feature_derivation",
            line.reference(),
            "line revenue outside the representable range",
        )
    })?;
    if revenue.is_negative() {
        return Err(PipelineError::integrity(
            "feature_derivation",
            line.reference(),
            format!("negative line revenue {revenue}"),
        ));
    }

    Ok(EnrichedLine {
        customer_id,
        revenue,
        calendar: Calendar::of(line.timestamp),
        line,
    })
}

pub fn enrich_all(lines: Vec<TransactionLine>) -> PipelineResult<Vec<EnrichedLine>> {
    let enriched = lines.into_iter().map(enrich).collect::<PipelineResult<Vec<_>>>()?;
    log::debug!("features: {} lines enriched", enriched.len());
    Ok(enriched)
}
