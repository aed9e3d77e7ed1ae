use super::Aggregator;
use crate::{
    features::{EnrichedLine, YearMonth},
    types::{round2, CustomerId, Money},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthAggregate {
    pub year_month:       YearMonth,
    pub revenue:          Money,
    pub order_count:      u64,
    pub active_customers: u64,
    /// Percent change against the previous observed month. `None` for the
    /// first month, or when the previous month had no revenue.
    pub growth_pct:       Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct MonthAccumulator {
    revenue:   Money,
    invoices:  BTreeSet<String>,
    customers: BTreeSet<CustomerId>,
}

#[derive(Default)]
pub struct MonthAggregator {
    by_month: BTreeMap<YearMonth, MonthAccumulator>,
}

impl Aggregator for MonthAggregator {
    type Row = MonthAggregate;

    fn name(&self) -> &'static str { "month" }

    fn observe(&mut self, line: &EnrichedLine) {
        let acc = self.by_month.entry(line.calendar.year_month).or_default();
        acc.revenue += line.revenue;
        acc.invoices.insert(line.line.invoice_id.clone());
        acc.customers.insert(line.customer_id);
    }

    fn merge(&mut self, other: Self) {
        for (month, partial) in other.by_month {
            let acc = self.by_month.entry(month).or_default();
            acc.revenue += partial.revenue;
            acc.invoices.extend(partial.invoices);
            acc.customers.extend(partial.customers);
        }
    }

    /// Rows in calendar order.
    fn finish(self) -> Vec<MonthAggregate> {
        let mut previous: Option<Money> = None;
        self.by_month
            .into_iter()
            .map(|(year_month, acc)| {
                let growth_pct = previous
                    .filter(|prev| prev.minor() != 0)
                    .map(|prev| {
                        round2(
                            (acc.revenue.minor() - prev.minor()) as f64 / prev.minor() as f64
                                * 100.0,
                        )
                    });
                previous = Some(acc.revenue);
                MonthAggregate {
                    year_month,
                    revenue: acc.revenue,
                    order_count: acc.invoices.len() as u64,
                    active_customers: acc.customers.len() as u64,
                    growth_pct,
                }
            })
            .collect()
    }
}
