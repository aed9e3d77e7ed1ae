//! Raw and typed transaction lines.
//!
//! A loader hands over `RawLine`s exactly as read (every field optional
//! text). `RawLine::parse` turns one into a `TransactionLine` or reports a
//! `SchemaViolation`; violations are counted by the cleaner and never abort
//! a run.

use crate::types::CustomerId;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp layouts accepted on input, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLine {
    #[serde(rename = "InvoiceNo", alias = "Invoice", alias = "invoice_id")]
    pub invoice_id:   Option<String>,
    #[serde(rename = "StockCode", alias = "product_code")]
    pub product_code: Option<String>,
    #[serde(rename = "Description", alias = "description")]
    pub description:  Option<String>,
    #[serde(rename = "Quantity", alias = "quantity")]
    pub quantity:     Option<String>,
    #[serde(rename = "UnitPrice", alias = "Price", alias = "unit_price")]
    pub unit_price:   Option<String>,
    #[serde(rename = "InvoiceDate", alias = "timestamp")]
    pub timestamp:    Option<String>,
    #[serde(rename = "CustomerID", alias = "Customer ID", alias = "customer_id")]
    pub customer_id:  Option<String>,
    #[serde(rename = "Country", alias = "country")]
    pub country:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub invoice_id:   String,
    pub product_code: String,
    pub description:  Option<String>,
    pub quantity:     i64,
    pub unit_price:   f64,
    pub timestamp:    NaiveDateTime,
    pub customer_id:  Option<CustomerId>,
    pub country:      String,
}

impl TransactionLine {
    /// Human-readable pointer to this line for diagnostics.
    pub fn reference(&self) -> String {
        match self.customer_id {
            Some(customer) => format!(
                "invoice {} / product {} / customer {customer}",
                self.invoice_id, self.product_code
            ),
            None => format!(
                "invoice {} / product {} / no customer",
                self.invoice_id, self.product_code
            ),
        }
    }
}

/// A row that could not be parsed into the expected types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row {row}: field '{field}' cannot be parsed from {value:?}")]
pub struct SchemaViolation {
    pub row:   usize,
    pub field: &'static str,
    pub value: String,
}

impl RawLine {
    /// Parse into typed fields. `row` is the zero-based input position,
    /// used only in the violation report.
    pub fn parse(&self, row: usize) -> Result<TransactionLine, SchemaViolation> {
        let violation = |field: &'static str, value: Option<&str>| SchemaViolation {
            row,
            field,
            value: value.unwrap_or_default().to_string(),
        };

        let invoice_id = present(&self.invoice_id)
            .ok_or_else(|| violation("invoice_id", self.invoice_id.as_deref()))?;
        let product_code = present(&self.product_code)
            .ok_or_else(|| violation("product_code", self.product_code.as_deref()))?;
        let country = present(&self.country)
            .ok_or_else(|| violation("country", self.country.as_deref()))?;

        let quantity = present(&self.quantity)
            .and_then(parse_integral)
            .ok_or_else(|| violation("quantity", self.quantity.as_deref()))?;
        let unit_price = present(&self.unit_price)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .ok_or_else(|| violation("unit_price", self.unit_price.as_deref()))?;
        let timestamp = present(&self.timestamp)
            .and_then(parse_timestamp)
            .ok_or_else(|| violation("timestamp", self.timestamp.as_deref()))?;

        // An empty customer id is a business-rule matter, not a schema one.
        let customer_id = match present(&self.customer_id) {
            None => None,
            Some(text) => Some(
                parse_integral(text)
                    .ok_or_else(|| violation("customer_id", Some(text)))?,
            ),
        };

        Ok(TransactionLine {
            invoice_id:   invoice_id.to_string(),
            product_code: product_code.to_string(),
            description:  present(&self.description).map(str::to_string),
            quantity,
            unit_price,
            timestamp,
            customer_id,
            country:      country.to_string(),
        })
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Integers, including integral float text such as "17850.0".
fn parse_integral(text: &str) -> Option<i64> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let f = text.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw() -> RawLine {
        RawLine {
            invoice_id:   Some("536365".into()),
            product_code: Some("85123A".into()),
            description:  Some("WHITE HANGING HEART T-LIGHT HOLDER".into()),
            quantity:     Some("6".into()),
            unit_price:   Some("2.55".into()),
            timestamp:    Some("12/1/2010 8:26".into()),
            customer_id:  Some("17850.0".into()),
            country:      Some("United Kingdom".into()),
        }
    }

    #[test]
    fn parses_online_retail_layout() {
        let line = raw().parse(0).unwrap();
        assert_eq!(line.quantity, 6);
        assert_eq!(line.customer_id, Some(17850));
        assert_eq!(
            line.timestamp,
            NaiveDate::from_ymd_opt(2010, 12, 1).unwrap().and_hms_opt(8, 26, 0).unwrap()
        );
    }

    #[test]
    fn accepts_iso_and_rfc3339_timestamps() {
        assert!(parse_timestamp("2010-12-01 08:26:00").is_some());
        assert!(parse_timestamp("2010-12-01T08:26:00").is_some());
        assert!(parse_timestamp("2010-12-01T08:26:00Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn empty_customer_is_not_a_schema_violation() {
        let mut r = raw();
        r.customer_id = Some("  ".into());
        assert_eq!(r.parse(0).unwrap().customer_id, None);
    }

    #[test]
    fn fractional_customer_is_a_schema_violation() {
        let mut r = raw();
        r.customer_id = Some("17850.5".into());
        let err = r.parse(3).unwrap_err();
        assert_eq!(err.field, "customer_id");
        assert_eq!(err.row, 3);
    }

    #[test]
    fn non_numeric_quantity_and_price_are_reported() {
        let mut r = raw();
        r.quantity = Some("six".into());
        assert_eq!(r.parse(0).unwrap_err().field, "quantity");

        let mut r = raw();
        r.unit_price = Some("NaN".into());
        assert_eq!(r.parse(0).unwrap_err().field, "unit_price");
    }

    #[test]
    fn missing_description_survives_parsing() {
        let mut r = raw();
        r.description = None;
        assert_eq!(r.parse(0).unwrap().description, None);
    }
}
