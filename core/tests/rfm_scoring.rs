//! RFM scoring: quantile bins, tie-breaks and the inverted recency scale.

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use rfm_core::{
    aggregate::CustomerAggregate,
    rfm::{bin_sizes, score, RfmScores},
    Money, PipelineError,
};

// ── Helpers ────────────────────────────────────────────────────────

fn day() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2011, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

fn customer(id: i64, recency_days: i64, order_count: u64, monetary_minor: i64) -> CustomerAggregate {
    let monetary = Money::from_minor(monetary_minor);
    CustomerAggregate {
        customer_id: id,
        monetary,
        order_count,
        total_units: order_count as i64,
        average_order_value: monetary.per(order_count),
        first_purchase: day(),
        last_purchase: day(),
        tenure_days: 0,
        recency_days,
        purchase_frequency: order_count as f64,
        is_repeat: order_count > 1,
        distinct_products: 1,
    }
}

fn scores_by_id(customers: Vec<CustomerAggregate>, bins: u8) -> Vec<(i64, RfmScores)> {
    score(customers, bins)
        .unwrap()
        .into_iter()
        .map(|s| (s.aggregate.customer_id, s.scores))
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────

#[test]
fn five_monetary_values_take_scores_one_to_five() {
    let customers = [10, 20, 30, 40, 50]
        .iter()
        .enumerate()
        .map(|(i, m)| customer(i as i64 + 1, 5, 1, m * 100))
        .collect();

    let monetary: Vec<u8> = scores_by_id(customers, 5).iter().map(|(_, s)| s.monetary).collect();

    assert_eq!(monetary, vec![1, 2, 3, 4, 5]);
}

/// Ties on the metric resolve by ascending customer id, never by input
/// position.
#[test]
fn ties_break_by_customer_id() {
    let customers = vec![
        customer(30, 1, 1, 500),
        customer(10, 1, 1, 500),
        customer(50, 1, 1, 500),
        customer(20, 1, 1, 500),
        customer(40, 1, 1, 500),
    ];

    let scored = scores_by_id(customers, 5);

    for (id, s) in scored {
        assert_eq!(i64::from(s.monetary), id / 10, "customer {id}");
        assert_eq!(i64::from(s.frequency), id / 10, "customer {id}");
    }
}

#[test]
fn most_recent_customer_scores_highest_recency() {
    let customers = vec![
        customer(1, 300, 1, 100),
        customer(2, 2, 1, 100),
        customer(3, 90, 1, 100),
        customer(4, 45, 1, 100),
        customer(5, 10, 1, 100),
    ];

    let scored = scores_by_id(customers, 5);
    let recency: Vec<(i64, u8)> = scored.iter().map(|(id, s)| (*id, s.recency)).collect();

    assert_eq!(recency, vec![(1, 1), (2, 5), (3, 2), (4, 3), (5, 4)]);
}

/// 7 customers into 5 bins: sizes 1,1,2,1,2.
#[test]
fn uneven_population_fills_bins_within_one() {
    assert_eq!(bin_sizes(7, 5), vec![1, 1, 2, 1, 2]);

    let customers = (1..=7).map(|id| customer(id, 1, 1, id * 100)).collect();
    let mut counts = [0usize; 5];
    for (_, s) in scores_by_id(customers, 5) {
        counts[usize::from(s.monetary) - 1] += 1;
    }
    assert_eq!(counts, [1, 1, 2, 1, 2]);
}

#[test]
fn single_customer_lands_in_the_top_bin() {
    let scored = scores_by_id(vec![customer(1, 0, 1, 100)], 5);
    assert_eq!(scored[0].1, RfmScores::new(1, 5, 5));
    assert_eq!(scored[0].1.code(), "155");
}

#[test]
fn bin_count_is_honoured() {
    let customers = (1..=9).map(|id| customer(id, 10 - id, id as u64, id * 100)).collect();
    for (id, s) in scores_by_id(customers, 3) {
        let expected = ((id + 2) / 3) as u8;
        assert_eq!(s.monetary, expected, "customer {id}");
        assert_eq!(s.frequency, expected, "customer {id}");
        assert_eq!(s.recency, expected, "customer {id}");
    }
}

#[test]
fn bin_count_outside_range_is_rejected() {
    for bins in [0, 1, 10] {
        match score(vec![customer(1, 1, 1, 100)], bins) {
            Err(PipelineError::Configuration { option, .. }) => assert_eq!(option, "bin_count"),
            other => panic!("bins={bins}: expected configuration error, got {other:?}"),
        }
    }
}

#[test]
fn empty_input_scores_nothing() {
    assert!(score(Vec::new(), 5).unwrap().is_empty());
}

// ── Properties ─────────────────────────────────────────────────────

proptest! {
    /// Higher monetary value never scores lower.
    #[test]
    fn monetary_scores_are_monotonic(values in proptest::collection::vec(0i64..5_000, 1..80)) {
        let customers = values
            .iter()
            .enumerate()
            .map(|(i, m)| customer(i as i64, 1, 1, *m))
            .collect();
        let scored = score(customers, 5).unwrap();

        for a in &scored {
            prop_assert!((1..=5).contains(&a.scores.monetary));
            for b in &scored {
                if a.aggregate.monetary > b.aggregate.monetary {
                    prop_assert!(a.scores.monetary >= b.scores.monetary);
                }
            }
        }
    }
}
