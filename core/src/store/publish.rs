use super::{datetime_text, PipelineStore};
use crate::{
    cleaning::ExclusionReport,
    error::{PipelineError, PipelineResult},
    pipeline::PipelineOutput,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Output tables, in publish order. Each has a `staging_` twin.
const OUTPUT_TABLES: [&str; 6] = [
    "enriched_line",
    "customer_metrics",
    "product_metrics",
    "invoice_metrics",
    "country_metrics",
    "month_metrics",
];

impl PipelineStore {
    // ── Publish ────────────────────────────────────────────────

    /// Write every output table for `run_id` as one atomic unit.
    ///
    /// Rows go to the staging tables first, then replace whatever was
    /// published for the run before. All of it happens in one transaction:
    /// on any error the transaction is dropped and rolled back, so readers
    /// only ever see the previous complete publish or the new one.
    pub fn publish(&self, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        let known: Option<i64> = tx
            .query_row("SELECT 1 FROM run WHERE run_id = ?1", params![run_id], |row| row.get(0))
            .optional()?;
        if known.is_none() {
            return Err(PipelineError::RunNotFound { run_id: run_id.to_string() });
        }

        for table in OUTPUT_TABLES {
            tx.execute(&format!("DELETE FROM staging_{table} WHERE run_id = ?1"), params![run_id])?;
        }
        stage_enriched(&tx, run_id, output)?;
        stage_customers(&tx, run_id, output)?;
        stage_products(&tx, run_id, output)?;
        stage_invoices(&tx, run_id, output)?;
        stage_countries(&tx, run_id, output)?;
        stage_months(&tx, run_id, output)?;

        for table in OUTPUT_TABLES {
            tx.execute(&format!("DELETE FROM {table} WHERE run_id = ?1"), params![run_id])?;
            tx.execute(
                &format!("INSERT INTO {table} SELECT * FROM staging_{table} WHERE run_id = ?1"),
                params![run_id],
            )?;
            tx.execute(&format!("DELETE FROM staging_{table} WHERE run_id = ?1"), params![run_id])?;
        }

        write_exclusions(&tx, run_id, &output.exclusions)?;
        tx.execute(
            "UPDATE run SET published_at = ?2, reference_date = ?3, input_rows = ?4,
                            cleaned_rows = ?5, total_revenue = ?6, fallback_count = ?7
             WHERE run_id = ?1",
            params![
                run_id,
                datetime_text(chrono::Utc::now().naive_utc()),
                output.reference_date.map(datetime_text),
                output.summary.input_rows as i64,
                output.summary.cleaned_rows as i64,
                output.summary.total_revenue.minor(),
                output.summary.segments.fallback as i64,
            ],
        )?;

        tx.commit()?;
        log::info!(
            "store: run {run_id} published ({} customers, {} lines)",
            output.customers.len(),
            output.enriched.len()
        );
        Ok(())
    }
}

fn write_exclusions(conn: &Connection, run_id: &str, report: &ExclusionReport) -> PipelineResult<()> {
    conn.execute("DELETE FROM exclusion_report WHERE run_id = ?1", params![run_id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO exclusion_report (run_id, position, rule, removed) VALUES (?1, ?2, ?3, ?4)",
    )?;
    stmt.execute(params![run_id, 0i64, "schema_violation", report.schema_violations as i64])?;
    for (i, count) in report.rules.iter().enumerate() {
        stmt.execute(params![run_id, (i + 1) as i64, count.rule.label(), count.removed as i64])?;
    }
    stmt.execute(params![
        run_id,
        (report.rules.len() + 1) as i64,
        "outlier_flagged",
        report.outliers_flagged as i64
    ])?;
    Ok(())
}

fn stage_enriched(conn: &Connection, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO staging_enriched_line (
            run_id, line_no, invoice_id, product_code, description, quantity, unit_price,
            timestamp, customer_id, country, revenue, year, month, day, hour, weekday, year_month
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?;
    for (line_no, e) in output.enriched.iter().enumerate() {
        stmt.execute(params![
            run_id,
            line_no as i64,
            &e.line.invoice_id,
            &e.line.product_code,
            &e.line.description,
            e.line.quantity,
            e.line.unit_price,
            datetime_text(e.line.timestamp),
            e.customer_id,
            &e.line.country,
            e.revenue.minor(),
            e.calendar.year,
            e.calendar.month,
            e.calendar.day,
            e.calendar.hour,
            e.calendar.weekday,
            e.calendar.year_month.to_string(),
        ])?;
    }
    Ok(())
}

fn stage_customers(conn: &Connection, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO staging_customer_metrics (
            run_id, customer_id, monetary, order_count, total_units, average_order_value,
            first_purchase, last_purchase, tenure_days, recency_days, purchase_frequency,
            is_repeat, distinct_products, r_score, f_score, m_score, rfm_code, segment
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
    )?;
    for m in &output.customers {
        let c = &m.customer;
        stmt.execute(params![
            run_id,
            c.customer_id,
            c.monetary.minor(),
            c.order_count as i64,
            c.total_units,
            c.average_order_value.minor(),
            datetime_text(c.first_purchase),
            datetime_text(c.last_purchase),
            c.tenure_days,
            c.recency_days,
            c.purchase_frequency,
            if c.is_repeat { 1 } else { 0 },
            c.distinct_products as i64,
            m.scores.recency,
            m.scores.frequency,
            m.scores.monetary,
            &m.rfm_code,
            m.segment.label(),
        ])?;
    }
    Ok(())
}

fn stage_products(conn: &Connection, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO staging_product_metrics (
            run_id, rank, product_code, description, total_revenue, units_sold,
            order_count, distinct_customers, average_price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for (rank, p) in output.products.iter().enumerate() {
        stmt.execute(params![
            run_id,
            (rank + 1) as i64,
            &p.product_code,
            &p.description,
            p.total_revenue.minor(),
            p.units_sold,
            p.order_count as i64,
            p.distinct_customers as i64,
            p.average_price,
        ])?;
    }
    Ok(())
}

fn stage_invoices(conn: &Connection, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO staging_invoice_metrics (
            run_id, invoice_id, customer_id, country, invoice_date, total_value,
            total_items, distinct_products
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for i in &output.invoices {
        stmt.execute(params![
            run_id,
            &i.invoice_id,
            i.customer_id,
            &i.country,
            datetime_text(i.invoice_date),
            i.total_value.minor(),
            i.total_items,
            i.distinct_products as i64,
        ])?;
    }
    Ok(())
}

fn stage_countries(conn: &Connection, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO staging_country_metrics (
            run_id, rank, country, total_revenue, order_count, distinct_customers, revenue_pct
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (rank, c) in output.countries.iter().enumerate() {
        stmt.execute(params![
            run_id,
            (rank + 1) as i64,
            &c.country,
            c.total_revenue.minor(),
            c.order_count as i64,
            c.distinct_customers as i64,
            c.revenue_pct,
        ])?;
    }
    Ok(())
}

fn stage_months(conn: &Connection, run_id: &str, output: &PipelineOutput) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO staging_month_metrics (
            run_id, year_month, revenue, order_count, active_customers, growth_pct
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for m in &output.months {
        stmt.execute(params![
            run_id,
            m.year_month.to_string(),
            m.revenue.minor(),
            m.order_count as i64,
            m.active_customers as i64,
            m.growth_pct,
        ])?;
    }
    Ok(())
}

pub(super) fn is_output_table(name: &str) -> bool {
    OUTPUT_TABLES.contains(&name)
}
