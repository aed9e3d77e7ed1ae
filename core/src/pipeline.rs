//! Pipeline: runs every stage over one loaded record set.
//!
//! STAGE ORDER (fixed):
//!   1. clean            (schema + business rules, exclusion counts)
//!   2. integrity check  (post-cleaning invariants)
//!   3. enrich           (line revenue, calendar parts)
//!   4. reference date   (config `as_of`, else latest transaction)
//!   5. aggregate        (five tables, optional partitioned fan-out)
//!   6. conservation     (every table's revenue equals the line total)
//!   7. score            (RFM quantile bins)
//!   8. classify         (segments)
//!
//! Any fatal error returns before an output exists, so no partial table is
//! ever handed to the store.

use crate::{
    aggregate::{
        fan_out, AggregateTables, CountryAggregate, InvoiceAggregate, MonthAggregate,
        ProductAggregate,
    },
    cleaning::{check_integrity, Cleaner, CleaningOutcome, ExclusionReport},
    config::PipelineConfig,
    error::{PipelineError, PipelineResult},
    features::{enrich_all, EnrichedLine},
    record::{RawLine, TransactionLine},
    rfm,
    segment::{classify_all, CustomerMetrics, SegmentSummary},
    types::Money,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_rows:     usize,
    pub cleaned_rows:   usize,
    /// Percent of input rows retained.
    pub retention_rate: f64,
    pub total_revenue:  Money,
    pub customers:      usize,
    pub segments:       SegmentSummary,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub enriched:       Vec<EnrichedLine>,
    pub exclusions:     ExclusionReport,
    /// `None` only when nothing survived cleaning and no `as_of` was given.
    pub reference_date: Option<NaiveDateTime>,
    pub customers:      Vec<CustomerMetrics>,
    pub products:       Vec<ProductAggregate>,
    pub invoices:       Vec<InvoiceAggregate>,
    pub countries:      Vec<CountryAggregate>,
    pub months:         Vec<MonthAggregate>,
    pub summary:        RunSummary,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validates the config up front; nothing runs on an invalid one.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, raw: &[RawLine]) -> PipelineResult<PipelineOutput> {
        let outcome = Cleaner::new(&self.config).clean_raw(raw);
        self.process(outcome)
    }

    /// Run over already-typed lines (no schema stage).
    pub fn run_lines(&self, lines: &[TransactionLine]) -> PipelineResult<PipelineOutput> {
        let outcome = Cleaner::new(&self.config).clean(lines);
        self.process(outcome)
    }

    fn process(&self, outcome: CleaningOutcome) -> PipelineResult<PipelineOutput> {
        let CleaningOutcome { lines, report } = outcome;

        check_integrity(&lines, &self.config)?;
        let enriched = enrich_all(lines)?;
        let reference_date = self.reference_date(&enriched)?;

        // Lines are non-negative, so every aggregate is bounded by these totals.
        let total_revenue = Money::checked_sum(enriched.iter().map(|l| l.revenue)).ok_or_else(|| {
            PipelineError::integrity(
                "feature_derivation",
                "all lines",
                "summed line revenue exceeds the representable range",
            )
        })?;
        enriched
            .iter()
            .try_fold(0i64, |units, l| units.checked_add(l.line.quantity))
            .ok_or_else(|| {
                PipelineError::integrity(
                    "feature_derivation",
                    "all lines",
                    "summed quantity exceeds the representable range",
                )
            })?;

        let tables = match reference_date {
            Some(reference) if !enriched.is_empty() => {
                fan_out(&enriched, reference, self.config.partitions)
            }
            _ => {
                log::warn!("pipeline: no lines survived cleaning, output tables are empty");
                AggregateTables::default()
            }
        };

        check_conservation(&tables, total_revenue)?;
        log::info!(
            "aggregate: {} customers, {} products, {} invoices, {} countries, {} months",
            tables.customers.len(),
            tables.products.len(),
            tables.invoices.len(),
            tables.countries.len(),
            tables.months.len(),
        );

        let AggregateTables { customers, products, invoices, countries, months } = tables;
        let scored = rfm::score(customers, self.config.bin_count)?;
        let (customers, segments) = classify_all(scored, &self.config.segment_rules);

        let summary = RunSummary {
            input_rows: report.input_rows,
            cleaned_rows: report.retained_rows,
            retention_rate: report.retention_rate(),
            total_revenue,
            customers: customers.len(),
            segments,
        };
        log::info!(
            "pipeline: {} lines in, {} cleaned, revenue {}, {} customers",
            summary.input_rows,
            summary.cleaned_rows,
            summary.total_revenue,
            summary.customers,
        );

        Ok(PipelineOutput {
            enriched,
            exclusions: report,
            reference_date,
            customers,
            products,
            invoices,
            countries,
            months,
            summary,
        })
    }

    /// An explicit `as_of` must not precede the data; recency would go
    /// negative.
    fn reference_date(&self, lines: &[EnrichedLine]) -> PipelineResult<Option<NaiveDateTime>> {
        let latest = lines.iter().map(|l| l.line.timestamp).max();
        match (self.config.as_of, latest) {
            (Some(as_of), Some(latest)) if as_of < latest => Err(PipelineError::configuration(
                "as_of",
                format!("{as_of} is earlier than the latest transaction {latest}"),
            )),
            (Some(as_of), _) => Ok(Some(as_of)),
            (None, latest) => Ok(latest),
        }
    }
}

/// Every table partitions the same lines, so each must sum to the line
/// total exactly.
fn check_conservation(tables: &AggregateTables, expected: Money) -> PipelineResult<()> {
    let totals: [(&'static str, Money); 5] = [
        ("customer_metrics", tables.customers.iter().map(|c| c.monetary).sum()),
        ("product_metrics", tables.products.iter().map(|p| p.total_revenue).sum()),
        ("invoice_metrics", tables.invoices.iter().map(|i| i.total_value).sum()),
        ("country_metrics", tables.countries.iter().map(|c| c.total_revenue).sum()),
        ("month_metrics", tables.months.iter().map(|m| m.revenue).sum()),
    ];
    for (table, total) in totals {
        if total != expected {
            return Err(PipelineError::integrity(
                "aggregation",
                table,
                format!("revenue {total} does not match line total {expected}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CustomerAggregate;
    use chrono::NaiveDate;

    #[test]
    fn conservation_flags_the_first_mismatched_table() {
        let ts = NaiveDate::from_ymd_opt(2011, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let tables = AggregateTables {
            customers: vec![CustomerAggregate {
                customer_id:         1,
                monetary:            Money::from_minor(999),
                order_count:         1,
                total_units:         1,
                average_order_value: Money::from_minor(999),
                first_purchase:      ts,
                last_purchase:       ts,
                tenure_days:         0,
                recency_days:        0,
                purchase_frequency:  1.0,
                is_repeat:           false,
                distinct_products:   1,
            }],
            ..AggregateTables::default()
        };
        let err = check_conservation(&tables, Money::from_minor(1000)).unwrap_err();
        match err {
            PipelineError::Integrity { stage, record, .. } => {
                assert_eq!(stage, "aggregation");
                assert_eq!(record, "customer_metrics");
            }
            other => panic!("expected integrity failure, got {other}"),
        }
    }

    #[test]
    fn empty_tables_conserve_zero() {
        assert!(check_conservation(&AggregateTables::default(), Money::ZERO).is_ok());
    }
}
