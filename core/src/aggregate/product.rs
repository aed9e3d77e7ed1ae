use super::Aggregator;
use crate::{
    features::EnrichedLine,
    types::{CustomerId, Money},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAggregate {
    pub product_code:       String,
    /// Most frequent description; ties go to the smallest text.
    pub description:        Option<String>,
    pub total_revenue:      Money,
    pub units_sold:         i64,
    pub order_count:        u64,
    pub distinct_customers: u64,
    /// Revenue per unit sold.
    pub average_price:      f64,
}

#[derive(Debug, Clone, Default)]
struct ProductAccumulator {
    revenue:      Money,
    units:        i64,
    invoices:     BTreeSet<String>,
    customers:    BTreeSet<CustomerId>,
    descriptions: BTreeMap<String, u64>,
}

#[derive(Default)]
pub struct ProductAggregator {
    by_product: BTreeMap<String, ProductAccumulator>,
}

impl Aggregator for ProductAggregator {
    type Row = ProductAggregate;

    fn name(&self) -> &'static str { "product" }

    fn observe(&mut self, line: &EnrichedLine) {
        let acc = self
            .by_product
            .entry(line.line.product_code.clone())
            .or_default();
        acc.revenue += line.revenue;
        acc.units += line.line.quantity;
        acc.invoices.insert(line.line.invoice_id.clone());
        acc.customers.insert(line.customer_id);
        if let Some(description) = &line.line.description {
            *acc.descriptions.entry(description.clone()).or_default() += 1;
        }
    }

    fn merge(&mut self, other: Self) {
        for (code, partial) in other.by_product {
            let acc = self.by_product.entry(code).or_default();
            acc.revenue += partial.revenue;
            acc.units += partial.units;
            acc.invoices.extend(partial.invoices);
            acc.customers.extend(partial.customers);
            for (description, count) in partial.descriptions {
                *acc.descriptions.entry(description).or_default() += count;
            }
        }
    }

    /// Rows by revenue descending, then product code.
    fn finish(self) -> Vec<ProductAggregate> {
        let mut rows: Vec<ProductAggregate> = self
            .by_product
            .into_iter()
            .map(|(product_code, acc)| {
                // BTreeMap iterates ascending, so the first maximum wins ties.
                let description = acc
                    .descriptions
                    .iter()
                    .fold(None::<(&String, u64)>, |best, (text, &count)| match best {
                        Some((_, best_count)) if best_count >= count => best,
                        _ => Some((text, count)),
                    })
                    .map(|(text, _)| text.clone());
                let average_price = if acc.units > 0 {
                    acc.revenue.as_major() / acc.units as f64
                } else {
                    0.0
                };
                ProductAggregate {
                    product_code,
                    description,
                    total_revenue: acc.revenue,
                    units_sold: acc.units,
                    order_count: acc.invoices.len() as u64,
                    distinct_customers: acc.customers.len() as u64,
                    average_price,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_revenue
                .cmp(&a.total_revenue)
                .then_with(|| a.product_code.cmp(&b.product_code))
        });
        rows
    }
}
