//! Aggregators: per-table figures, partitioned fan-out and order
//! independence.

use chrono::{NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rfm_core::{
    aggregate::{fan_out, purchase_frequency, AggregateTables},
    features::{enrich_all, EnrichedLine, YearMonth},
    Money, Pipeline, PipelineConfig, TransactionLine,
};

// ── Helpers ────────────────────────────────────────────────────────

fn at(month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2011, month, day).unwrap().and_hms_opt(12, 0, 0).unwrap()
}

fn line(
    invoice: &str,
    customer: i64,
    product: &str,
    quantity: i64,
    unit_price: f64,
    timestamp: NaiveDateTime,
    country: &str,
) -> TransactionLine {
    TransactionLine {
        invoice_id:   invoice.to_string(),
        product_code: product.to_string(),
        description:  Some(format!("ITEM {product}")),
        quantity,
        unit_price,
        timestamp,
        customer_id:  Some(customer),
        country:      country.to_string(),
    }
}

fn sample_lines() -> Vec<TransactionLine> {
    vec![
        line("1001", 1, "A", 2, 10.0, at(1, 5), "United Kingdom"),
        line("1001", 1, "B", 1, 5.5, at(1, 5), "United Kingdom"),
        line("1002", 1, "A", 1, 10.0, at(2, 4), "United Kingdom"),
        line("1003", 2, "C", 10, 0.85, at(1, 20), "France"),
        line("1004", 2, "A", 3, 10.0, at(3, 1), "France"),
        line("1005", 3, "B", 4, 5.5, at(2, 14), "Germany"),
        line("1006", 4, "C", 12, 0.85, at(3, 3), "United Kingdom"),
        line("1007", 4, "C", 6, 0.85, at(3, 9), "United Kingdom"),
    ]
}

fn enriched() -> Vec<EnrichedLine> {
    enrich_all(sample_lines()).unwrap()
}

fn reference() -> NaiveDateTime {
    at(3, 10)
}

fn tables() -> AggregateTables {
    fan_out(&enriched(), reference(), 1)
}

// ── Tests ──────────────────────────────────────────────────────────

#[test]
fn customer_metrics_cover_value_orders_and_tenure() {
    let t = tables();
    let c1 = t.customers.iter().find(|c| c.customer_id == 1).unwrap();

    assert_eq!(c1.monetary, Money::from_minor(3550));
    assert_eq!(c1.order_count, 2);
    assert_eq!(c1.total_units, 4);
    assert_eq!(c1.average_order_value, Money::from_minor(1775));
    assert_eq!(c1.tenure_days, 30);
    assert_eq!(c1.recency_days, 34);
    assert_eq!(c1.distinct_products, 2);
    assert!(c1.is_repeat);
    assert!((c1.purchase_frequency - 2.0).abs() < 1e-12);

    let c3 = t.customers.iter().find(|c| c.customer_id == 3).unwrap();
    assert!(!c3.is_repeat);
    assert_eq!(c3.tenure_days, 0);
    assert!((c3.purchase_frequency - 1.0).abs() < 1e-12);
}

/// Tenure under one 30-day unit counts as one unit.
#[test]
fn purchase_frequency_floors_tenure_at_one_unit() {
    assert_eq!(purchase_frequency(1, 0), 1.0);
    assert_eq!(purchase_frequency(3, 10), 3.0);
    assert_eq!(purchase_frequency(3, 90), 1.0);
}

#[test]
fn customer_rows_are_ordered_by_id() {
    let ids: Vec<i64> = tables().customers.iter().map(|c| c.customer_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn product_metrics_rank_by_revenue() {
    let t = tables();
    let codes: Vec<&str> = t.products.iter().map(|p| p.product_code.as_str()).collect();
    // A 60.00, B 27.50, C 23.80
    assert_eq!(codes, vec!["A", "B", "C"]);

    let a = &t.products[0];
    assert_eq!(a.total_revenue, Money::from_minor(6000));
    assert_eq!(a.units_sold, 6);
    assert_eq!(a.order_count, 3);
    assert_eq!(a.distinct_customers, 2);
    assert!((a.average_price - 10.0).abs() < 1e-12);
    assert_eq!(a.description.as_deref(), Some("ITEM A"));

    let c = &t.products[2];
    assert_eq!(c.units_sold, 28);
    assert!((c.average_price - 0.85).abs() < 1e-9);
}

/// The most frequent description wins; ties go to the smallest text.
#[test]
fn product_description_is_the_most_frequent() {
    let mut lines = vec![
        line("1", 1, "X", 1, 1.0, at(1, 1), "France"),
        line("2", 1, "X", 1, 1.0, at(1, 2), "France"),
        line("3", 1, "X", 1, 1.0, at(1, 3), "France"),
    ];
    lines[0].description = Some("ZEBRA MUG".into());
    lines[1].description = Some("ZEBRA MUG".into());
    lines[2].description = Some("A MUG".into());
    let t = fan_out(&enrich_all(lines.clone()).unwrap(), reference(), 1);
    assert_eq!(t.products[0].description.as_deref(), Some("ZEBRA MUG"));

    lines.truncate(2);
    lines[1].description = Some("A MUG".into());
    let t = fan_out(&enrich_all(lines).unwrap(), reference(), 1);
    assert_eq!(t.products[0].description.as_deref(), Some("A MUG"));
}

#[test]
fn invoice_metrics_sum_lines_per_invoice() {
    let t = tables();
    let inv = t.invoices.iter().find(|i| i.invoice_id == "1001").unwrap();
    assert_eq!(inv.total_value, Money::from_minor(2550));
    assert_eq!(inv.total_items, 3);
    assert_eq!(inv.distinct_products, 2);
    assert_eq!(inv.customer_id, 1);
    assert_eq!(inv.country, "United Kingdom");
    assert_eq!(inv.invoice_date, at(1, 5));
    assert_eq!(t.invoices.len(), 7);
}

#[test]
fn country_shares_sum_to_one_hundred() {
    let t = tables();
    let names: Vec<&str> = t.countries.iter().map(|c| c.country.as_str()).collect();
    // UK 50.80, France 38.50, Germany 22.00
    assert_eq!(names, vec!["United Kingdom", "France", "Germany"]);

    let uk = &t.countries[0];
    assert_eq!(uk.total_revenue, Money::from_minor(5080));
    assert_eq!(uk.order_count, 4);
    assert_eq!(uk.distinct_customers, 2);

    let pct: f64 = t.countries.iter().map(|c| c.revenue_pct).sum();
    assert!((pct - 100.0).abs() < 0.05, "shares sum to {pct}");
}

#[test]
fn month_metrics_report_growth_against_previous_month() {
    let t = tables();
    let months: Vec<YearMonth> = t.months.iter().map(|m| m.year_month).collect();
    assert_eq!(
        months,
        vec![
            YearMonth { year: 2011, month: 1 },
            YearMonth { year: 2011, month: 2 },
            YearMonth { year: 2011, month: 3 },
        ]
    );

    // Jan 34.00, Feb 32.00, Mar 45.30
    assert_eq!(t.months[0].revenue, Money::from_minor(3400));
    assert_eq!(t.months[0].growth_pct, None);
    assert_eq!(t.months[1].growth_pct, Some(-5.88));
    assert_eq!(t.months[2].growth_pct, Some(41.56));
    assert_eq!(t.months[2].active_customers, 2);
    assert_eq!(t.months[2].order_count, 3);
}

/// Every table partitions the same lines, so each sums to the line total.
#[test]
fn revenue_is_conserved_across_tables() {
    let lines = enriched();
    let total: Money = lines.iter().map(|l| l.revenue).sum();
    let t = fan_out(&lines, reference(), 1);

    assert_eq!(t.customers.iter().map(|c| c.monetary).sum::<Money>(), total);
    assert_eq!(t.products.iter().map(|p| p.total_revenue).sum::<Money>(), total);
    assert_eq!(t.invoices.iter().map(|i| i.total_value).sum::<Money>(), total);
    assert_eq!(t.countries.iter().map(|c| c.total_revenue).sum::<Money>(), total);
    assert_eq!(t.months.iter().map(|m| m.revenue).sum::<Money>(), total);
}

#[test]
fn partitioned_fan_out_matches_single_pass() {
    let lines = enriched();
    let single = fan_out(&lines, reference(), 1);
    for partitions in [2, 3, 5, 8, 16] {
        let split = fan_out(&lines, reference(), partitions);
        assert_eq!(split, single, "partitions={partitions} diverged from single pass");
    }
}

#[test]
fn shuffled_input_yields_identical_tables() {
    let config = PipelineConfig { as_of: Some(reference()), ..PipelineConfig::default() };
    let pipeline = Pipeline::new(config).unwrap();
    let baseline = pipeline.run_lines(&sample_lines()).unwrap();

    let mut rng = Pcg64::seed_from_u64(0x5EED_0001);
    for round in 0..10 {
        let mut shuffled = sample_lines();
        shuffled.shuffle(&mut rng);
        let out = pipeline.run_lines(&shuffled).unwrap();

        assert_eq!(out.customers, baseline.customers, "round {round}: customer metrics differ");
        assert_eq!(out.products, baseline.products, "round {round}: product metrics differ");
        assert_eq!(out.invoices, baseline.invoices, "round {round}: invoice metrics differ");
        assert_eq!(out.countries, baseline.countries, "round {round}: country metrics differ");
        assert_eq!(out.months, baseline.months, "round {round}: month metrics differ");
    }
}

/// Two orders over 30 days against one order on a single day: the repeat
/// buyer outscores on frequency and value, and the one-day buyer's
/// frequency falls back to the order count.
#[test]
fn repeat_buyer_outscores_single_order_buyer() {
    let lines = vec![
        line("2001", 10, "A", 30, 10.0, at(1, 1), "United Kingdom"),
        line("2002", 10, "A", 20, 10.0, at(1, 31), "United Kingdom"),
        line("2003", 20, "A", 5, 10.0, at(1, 15), "United Kingdom"),
    ];
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let out = pipeline.run_lines(&lines).unwrap();

    let x = out.customers.iter().find(|m| m.customer.customer_id == 10).unwrap();
    let y = out.customers.iter().find(|m| m.customer.customer_id == 20).unwrap();
    assert_eq!(x.customer.monetary, Money::from_minor(50_000));
    assert_eq!(x.customer.tenure_days, 30);
    assert_eq!(y.customer.monetary, Money::from_minor(5_000));
    assert_eq!(y.customer.tenure_days, 0);
    assert_eq!(y.customer.purchase_frequency, 1.0);
    assert!(x.scores.frequency > y.scores.frequency);
    assert!(x.scores.monetary > y.scores.monetary);
}
