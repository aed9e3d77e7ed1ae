use super::Aggregator;
use crate::{
    features::EnrichedLine,
    types::{CustomerId, Money},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Days in one purchase-frequency tenure unit.
pub const TENURE_UNIT_DAYS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub customer_id:         CustomerId,
    pub monetary:            Money,
    /// Distinct invoices.
    pub order_count:         u64,
    pub total_units:         i64,
    pub average_order_value: Money,
    pub first_purchase:      NaiveDateTime,
    pub last_purchase:       NaiveDateTime,
    pub tenure_days:         i64,
    pub recency_days:        i64,
    pub purchase_frequency:  f64,
    pub is_repeat:           bool,
    pub distinct_products:   u64,
}

/// Orders per 30-day unit of tenure. Tenure shorter than one unit counts
/// as one unit, so a single-day customer's frequency is their order count.
pub fn purchase_frequency(order_count: u64, tenure_days: i64) -> f64 {
    let units = (tenure_days as f64 / TENURE_UNIT_DAYS).max(1.0);
    order_count as f64 / units
}

#[derive(Debug, Clone)]
struct CustomerAccumulator {
    monetary: Money,
    invoices: BTreeSet<String>,
    units:    i64,
    first:    NaiveDateTime,
    last:     NaiveDateTime,
    products: BTreeSet<String>,
}

impl CustomerAccumulator {
    fn start(line: &EnrichedLine) -> Self {
        Self {
            monetary: Money::ZERO,
            invoices: BTreeSet::new(),
            units:    0,
            first:    line.line.timestamp,
            last:     line.line.timestamp,
            products: BTreeSet::new(),
        }
    }

    fn absorb(&mut self, other: CustomerAccumulator) {
        self.monetary += other.monetary;
        self.invoices.extend(other.invoices);
        self.units += other.units;
        self.first = self.first.min(other.first);
        self.last = self.last.max(other.last);
        self.products.extend(other.products);
    }
}

pub struct CustomerAggregator {
    reference:   NaiveDateTime,
    by_customer: BTreeMap<CustomerId, CustomerAccumulator>,
}

impl CustomerAggregator {
    pub fn new(reference: NaiveDateTime) -> Self {
        Self {
            reference,
            by_customer: BTreeMap::new(),
        }
    }
}

impl Aggregator for CustomerAggregator {
    type Row = CustomerAggregate;

    fn name(&self) -> &'static str { "customer" }

    fn observe(&mut self, line: &EnrichedLine) {
        let acc = self
            .by_customer
            .entry(line.customer_id)
            .or_insert_with(|| CustomerAccumulator::start(line));
        acc.monetary += line.revenue;
        acc.invoices.insert(line.line.invoice_id.clone());
        acc.units += line.line.quantity;
        acc.first = acc.first.min(line.line.timestamp);
        acc.last = acc.last.max(line.line.timestamp);
        acc.products.insert(line.line.product_code.clone());
    }

    fn merge(&mut self, other: Self) {
        for (customer_id, partial) in other.by_customer {
            match self.by_customer.get_mut(&customer_id) {
                Some(acc) => acc.absorb(partial),
                None => {
                    self.by_customer.insert(customer_id, partial);
                }
            }
        }
    }

    /// Rows ascending by customer id.
    fn finish(self) -> Vec<CustomerAggregate> {
        let reference = self.reference;
        self.by_customer
            .into_iter()
            .map(|(customer_id, acc)| {
                let order_count = acc.invoices.len() as u64;
                let tenure_days = (acc.last - acc.first).num_days();
                CustomerAggregate {
                    customer_id,
                    monetary: acc.monetary,
                    order_count,
                    total_units: acc.units,
                    average_order_value: acc.monetary.per(order_count),
                    first_purchase: acc.first,
                    last_purchase: acc.last,
                    tenure_days,
                    recency_days: (reference - acc.last).num_days(),
                    purchase_frequency: purchase_frequency(order_count, tenure_days),
                    is_repeat: order_count > 1,
                    distinct_products: acc.products.len() as u64,
                }
            })
            .collect()
    }
}
