use super::{publish::is_output_table, PipelineStore};
use crate::error::{PipelineError, PipelineResult};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

impl PipelineStore {
    // ── Read-back ──────────────────────────────────────────────

    pub fn is_published(&self, run_id: &str) -> PipelineResult<bool> {
        let published: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT published_at FROM run WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(matches!(published, Some(Some(_))))
    }

    pub fn customer_metrics_count(&self, run_id: &str) -> PipelineResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM customer_metrics WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Sum of published customer monetary totals, in minor units.
    pub fn total_monetary_minor(&self, run_id: &str) -> PipelineResult<i64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(monetary), 0) FROM customer_metrics WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn segment_counts(&self, run_id: &str) -> PipelineResult<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(
            "SELECT segment, COUNT(*) FROM customer_metrics
             WHERE run_id = ?1 GROUP BY segment ORDER BY segment",
        )?;
        let counts = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(counts)
    }

    pub fn customer_segment(&self, run_id: &str, customer_id: i64) -> PipelineResult<Option<String>> {
        let segment = self
            .conn
            .query_row(
                "SELECT segment FROM customer_metrics WHERE run_id = ?1 AND customer_id = ?2",
                params![run_id, customer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(segment)
    }

    /// Exclusion counts in rule order, bracketed by schema violations and
    /// flagged outliers.
    pub fn exclusion_counts(&self, run_id: &str) -> PipelineResult<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT rule, removed FROM exclusion_report WHERE run_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rows of `table` for `run_id`. Only output and staging table names
    /// are accepted; any other name is a caller error, not bad config.
    pub fn row_count(&self, table: &str, run_id: &str) -> PipelineResult<usize> {
        let base = table.strip_prefix("staging_").unwrap_or(table);
        if !is_output_table(base) {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "'{table}' is not an output table"
            )));
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE run_id = ?1"),
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
