//! Feature derivation: line revenue and calendar parts.

use chrono::NaiveDate;
use rfm_core::{
    features::{enrich, enrich_all, YearMonth},
    Money, PipelineError, TransactionLine,
};

fn line(customer: Option<i64>, quantity: i64, unit_price: f64) -> TransactionLine {
    TransactionLine {
        invoice_id:   "536365".to_string(),
        product_code: "71053".to_string(),
        description:  Some("WHITE METAL LANTERN".to_string()),
        quantity,
        unit_price,
        // Wednesday
        timestamp:    NaiveDate::from_ymd_opt(2010, 12, 1).unwrap().and_hms_opt(8, 26, 0).unwrap(),
        customer_id:  customer,
        country:      "United Kingdom".to_string(),
    }
}

#[test]
fn revenue_is_quantity_times_price_at_currency_precision() {
    let e = enrich(line(Some(17850), 6, 3.39)).unwrap();
    assert_eq!(e.revenue, Money::from_minor(2034));
    assert_eq!(e.revenue.to_string(), "20.34");
    assert_eq!(e.customer_id, 17850);
}

#[test]
fn calendar_parts_follow_the_timestamp() {
    let e = enrich(line(Some(1), 1, 1.0)).unwrap();
    assert_eq!(e.calendar.year, 2010);
    assert_eq!(e.calendar.month, 12);
    assert_eq!(e.calendar.day, 1);
    assert_eq!(e.calendar.hour, 8);
    assert_eq!(e.calendar.weekday, 2, "Monday is 0, so Wednesday is 2");
    assert_eq!(e.calendar.year_month, YearMonth { year: 2010, month: 12 });
    assert_eq!(e.calendar.year_month.to_string(), "2010-12");
}

/// Enrichment only runs on cleaned lines; a missing customer means the
/// cleaner let something through.
#[test]
fn missing_customer_is_an_integrity_failure() {
    match enrich(line(None, 1, 1.0)) {
        Err(PipelineError::Integrity { stage, .. }) => assert_eq!(stage, "feature_derivation"),
        other => panic!("expected integrity failure, got {other:?}"),
    }
}

#[test]
fn negative_revenue_is_an_integrity_failure() {
    assert!(matches!(
        enrich(line(Some(1), -2, 1.0)),
        Err(PipelineError::Integrity { stage: "feature_derivation", .. })
    ));
}

#[test]
fn unrepresentable_revenue_is_an_integrity_failure() {
    assert!(matches!(
        enrich(line(Some(1), 1, 1e17)),
        Err(PipelineError::Integrity { stage: "feature_derivation", .. })
    ));
}

#[test]
fn enrich_all_preserves_line_order() {
    let mut second = line(Some(2), 1, 1.0);
    second.invoice_id = "536366".to_string();
    let enriched = enrich_all(vec![line(Some(1), 1, 1.0), second]).unwrap();
    let ids: Vec<i64> = enriched.iter().map(|e| e.customer_id).collect();
    assert_eq!(ids, vec![1, 2]);
}
