//! Aggregators: five independent reductions over the enriched set.
//!
//! RULES:
//!   - Each aggregator owns its accumulation state; none reads another's.
//!   - Monetary sums accumulate as `Money`, so line order never changes a total.
//!   - Partials built over disjoint partitions merge to the single-pass result.
//!
//! The pipeline feeds every enriched line through one `AggregateSet`
//! (fan-out), rather than re-deriving features per aggregate.

pub mod country;
pub mod customer;
pub mod invoice;
pub mod month;
pub mod product;

pub use country::{CountryAggregate, CountryAggregator};
pub use customer::{purchase_frequency, CustomerAggregate, CustomerAggregator, TENURE_UNIT_DAYS};
pub use invoice::{InvoiceAggregate, InvoiceAggregator};
pub use month::{MonthAggregate, MonthAggregator};
pub use product::{ProductAggregate, ProductAggregator};

use crate::features::EnrichedLine;
use chrono::NaiveDateTime;

/// The contract every aggregator fulfils.
pub trait Aggregator: Send {
    type Row;

    /// Unique stable name, used in logs and integrity failures.
    fn name(&self) -> &'static str;

    /// Fold one line into the accumulator.
    fn observe(&mut self, line: &EnrichedLine);

    /// Absorb a partial built over a disjoint set of lines.
    fn merge(&mut self, other: Self)
    where
        Self: Sized;

    /// Produce the output table, one row per key.
    fn finish(self) -> Vec<Self::Row>
    where
        Self: Sized;
}

/// All five accumulators for one partition of the enriched set.
pub struct AggregateSet {
    customers: CustomerAggregator,
    products:  ProductAggregator,
    invoices:  InvoiceAggregator,
    countries: CountryAggregator,
    months:    MonthAggregator,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTables {
    pub customers: Vec<CustomerAggregate>,
    pub products:  Vec<ProductAggregate>,
    pub invoices:  Vec<InvoiceAggregate>,
    pub countries: Vec<CountryAggregate>,
    pub months:    Vec<MonthAggregate>,
}

impl AggregateSet {
    /// `reference` is the run's fixed as-of date for recency.
    pub fn new(reference: NaiveDateTime) -> Self {
        Self {
            customers: CustomerAggregator::new(reference),
            products:  ProductAggregator::default(),
            invoices:  InvoiceAggregator::default(),
            countries: CountryAggregator::default(),
            months:    MonthAggregator::default(),
        }
    }

    pub fn observe(&mut self, line: &EnrichedLine) {
        self.customers.observe(line);
        self.products.observe(line);
        self.invoices.observe(line);
        self.countries.observe(line);
        self.months.observe(line);
    }

    pub fn merge(&mut self, other: AggregateSet) {
        self.customers.merge(other.customers);
        self.products.merge(other.products);
        self.invoices.merge(other.invoices);
        self.countries.merge(other.countries);
        self.months.merge(other.months);
    }

    pub fn finish(self) -> AggregateTables {
        AggregateTables {
            customers: finish_logged(self.customers),
            products:  finish_logged(self.products),
            invoices:  finish_logged(self.invoices),
            countries: finish_logged(self.countries),
            months:    finish_logged(self.months),
        }
    }
}

fn finish_logged<A: Aggregator>(aggregator: A) -> Vec<A::Row> {
    let name = aggregator.name();
    let rows = aggregator.finish();
    log::debug!("aggregate: {name} produced {} rows", rows.len());
    rows
}

/// Reduce `lines` into every output table.
///
/// With `partitions > 1` the lines are split into contiguous chunks, each
/// chunk is reduced on its own scoped thread, and the partials are merged
/// in chunk order.
pub fn fan_out(lines: &[EnrichedLine], reference: NaiveDateTime, partitions: usize) -> AggregateTables {
    if partitions <= 1 || lines.len() < 2 {
        let mut set = AggregateSet::new(reference);
        for line in lines {
            set.observe(line);
        }
        return set.finish();
    }

    let chunk_len = lines.len().div_ceil(partitions);
    let partials: Vec<AggregateSet> = std::thread::scope(|scope| {
        let handles: Vec<_> = lines
            .chunks(chunk_len)
            .map(|part| {
                scope.spawn(move || {
                    let mut set = AggregateSet::new(reference);
                    for line in part {
                        set.observe(line);
                    }
                    set
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });
    log::debug!("aggregate: merging {} partitions", partials.len());

    let mut partials = partials.into_iter();
    let mut merged = match partials.next() {
        Some(first) => first,
        None => AggregateSet::new(reference),
    };
    for partial in partials {
        merged.merge(partial);
    }
    merged.finish()
}
