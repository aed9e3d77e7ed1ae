use super::Aggregator;
use crate::{
    features::EnrichedLine,
    types::{CustomerId, Money},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAggregate {
    pub invoice_id:        String,
    pub customer_id:       CustomerId,
    pub country:           String,
    pub invoice_date:      NaiveDateTime,
    pub total_value:       Money,
    pub total_items:       i64,
    pub distinct_products: u64,
}

/// Earliest line of the invoice; ties resolve by customer then country so
/// the anchor does not depend on line order.
type Anchor = (NaiveDateTime, CustomerId, String);

#[derive(Debug, Clone)]
struct InvoiceAccumulator {
    total:    Money,
    items:    i64,
    products: BTreeSet<String>,
    anchor:   Anchor,
}

#[derive(Default)]
pub struct InvoiceAggregator {
    by_invoice: BTreeMap<String, InvoiceAccumulator>,
}

impl Aggregator for InvoiceAggregator {
    type Row = InvoiceAggregate;

    fn name(&self) -> &'static str { "invoice" }

    fn observe(&mut self, line: &EnrichedLine) {
        let anchor: Anchor = (line.line.timestamp, line.customer_id, line.line.country.clone());
        let acc = self
            .by_invoice
            .entry(line.line.invoice_id.clone())
            .or_insert_with(|| InvoiceAccumulator {
                total:    Money::ZERO,
                items:    0,
                products: BTreeSet::new(),
                anchor:   anchor.clone(),
            });
        acc.total += line.revenue;
        acc.items += line.line.quantity;
        acc.products.insert(line.line.product_code.clone());
        if anchor < acc.anchor {
            acc.anchor = anchor;
        }
    }

    fn merge(&mut self, other: Self) {
        for (invoice_id, partial) in other.by_invoice {
            match self.by_invoice.get_mut(&invoice_id) {
                Some(acc) => {
                    acc.total += partial.total;
                    acc.items += partial.items;
                    acc.products.extend(partial.products);
                    if partial.anchor < acc.anchor {
                        acc.anchor = partial.anchor;
                    }
                }
                None => {
                    self.by_invoice.insert(invoice_id, partial);
                }
            }
        }
    }

    /// Rows ascending by invoice id.
    fn finish(self) -> Vec<InvoiceAggregate> {
        self.by_invoice
            .into_iter()
            .map(|(invoice_id, acc)| {
                let (invoice_date, customer_id, country) = acc.anchor;
                InvoiceAggregate {
                    invoice_id,
                    customer_id,
                    country,
                    invoice_date,
                    total_value: acc.total,
                    total_items: acc.items,
                    distinct_products: acc.products.len() as u64,
                }
            })
            .collect()
    }
}
