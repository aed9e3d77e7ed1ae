use super::Aggregator;
use crate::{
    features::EnrichedLine,
    types::{round2, CustomerId, Money},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryAggregate {
    pub country:            String,
    pub total_revenue:      Money,
    pub order_count:        u64,
    pub distinct_customers: u64,
    /// Share of the grand total, in percent, two decimals.
    pub revenue_pct:        f64,
}

#[derive(Debug, Clone, Default)]
struct CountryAccumulator {
    revenue:   Money,
    invoices:  BTreeSet<String>,
    customers: BTreeSet<CustomerId>,
}

#[derive(Default)]
pub struct CountryAggregator {
    by_country: BTreeMap<String, CountryAccumulator>,
}

impl Aggregator for CountryAggregator {
    type Row = CountryAggregate;

    fn name(&self) -> &'static str { "country" }

    fn observe(&mut self, line: &EnrichedLine) {
        let acc = self.by_country.entry(line.line.country.clone()).or_default();
        acc.revenue += line.revenue;
        acc.invoices.insert(line.line.invoice_id.clone());
        acc.customers.insert(line.customer_id);
    }

    fn merge(&mut self, other: Self) {
        for (country, partial) in other.by_country {
            let acc = self.by_country.entry(country).or_default();
            acc.revenue += partial.revenue;
            acc.invoices.extend(partial.invoices);
            acc.customers.extend(partial.customers);
        }
    }

    /// Rows by revenue descending, then country.
    fn finish(self) -> Vec<CountryAggregate> {
        let grand_total: Money = self.by_country.values().map(|acc| acc.revenue).sum();
        let mut rows: Vec<CountryAggregate> = self
            .by_country
            .into_iter()
            .map(|(country, acc)| {
                let revenue_pct = if grand_total.minor() > 0 {
                    round2(acc.revenue.minor() as f64 / grand_total.minor() as f64 * 100.0)
                } else {
                    0.0
                };
                CountryAggregate {
                    country,
                    total_revenue: acc.revenue,
                    order_count: acc.invoices.len() as u64,
                    distinct_customers: acc.customers.len() as u64,
                    revenue_pct,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_revenue
                .cmp(&a.total_revenue)
                .then_with(|| a.country.cmp(&b.country))
        });
        rows
    }
}
