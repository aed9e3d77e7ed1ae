//! RFM scoring: equal-population quantile bins per dimension.
//!
//! Each dimension is ranked on its own over `(metric, customer_id)`, so ties
//! on the metric resolve by ascending customer id and the result never
//! depends on input order. Rank `r` of `n` lands in bin `ceil(r * bins / n)`;
//! bin sizes differ by at most one.
//!
//! Recency is inverted: the fewest days since the last purchase scores
//! highest.

use crate::{
    aggregate::CustomerAggregate,
    config::{MAX_BIN_COUNT, MIN_BIN_COUNT},
    error::{PipelineError, PipelineResult},
    types::CustomerId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RfmScores {
    pub recency:   u8,
    pub frequency: u8,
    pub monetary:  u8,
}

impl RfmScores {
    pub const fn new(recency: u8, frequency: u8, monetary: u8) -> Self {
        Self { recency, frequency, monetary }
    }

    /// Three-digit code, recency first ("545").
    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RfmScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.recency, self.frequency, self.monetary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCustomer {
    pub aggregate: CustomerAggregate,
    pub scores:    RfmScores,
}

/// Score every customer. Rows come back in input order.
pub fn score(customers: Vec<CustomerAggregate>, bins: u8) -> PipelineResult<Vec<ScoredCustomer>> {
    if !(MIN_BIN_COUNT..=MAX_BIN_COUNT).contains(&bins) {
        return Err(PipelineError::configuration(
            "bin_count",
            format!("must be within {MIN_BIN_COUNT}..={MAX_BIN_COUNT}, got {bins}"),
        ));
    }

    let recency = rank_bins(&customers, bins, |c| c.recency_days);
    let frequency = rank_bins(&customers, bins, |c| c.order_count);
    let monetary = rank_bins(&customers, bins, |c| c.monetary);

    let scored: Vec<ScoredCustomer> = customers
        .into_iter()
        .enumerate()
        .map(|(i, aggregate)| ScoredCustomer {
            aggregate,
            scores: RfmScores {
                recency:   bins + 1 - recency[i],
                frequency: frequency[i],
                monetary:  monetary[i],
            },
        })
        .collect();

    log::info!("rfm: {} customers scored into {bins} bins", scored.len());
    Ok(scored)
}

/// Bin (1..=bins) of each customer, indexed like `customers`.
fn rank_bins<K, F>(customers: &[CustomerAggregate], bins: u8, metric: F) -> Vec<u8>
where
    K: Ord,
    F: Fn(&CustomerAggregate) -> K,
{
    let n = customers.len();
    let mut order: Vec<(K, CustomerId, usize)> = customers
        .iter()
        .enumerate()
        .map(|(i, c)| (metric(c), c.customer_id, i))
        .collect();
    order.sort();

    let mut out = vec![0u8; n];
    for (rank0, (_, _, index)) in order.into_iter().enumerate() {
        out[index] = bin_of(rank0 + 1, n, bins);
    }
    out
}

/// `ceil(rank * bins / n)` for a 1-based rank.
fn bin_of(rank: usize, n: usize, bins: u8) -> u8 {
    let bins = usize::from(bins);
    ((rank * bins + n - 1) / n) as u8
}

/// How many customers land in each bin, lowest bin first.
pub fn bin_sizes(n: usize, bins: u8) -> Vec<usize> {
    let mut sizes = vec![0usize; usize::from(bins)];
    for rank in 1..=n {
        sizes[usize::from(bin_of(rank, n, bins)) - 1] += 1;
    }
    sizes
}
