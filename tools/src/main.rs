//! pipeline-runner: batch RFM segmentation over a transaction-line CSV.
//!
//! Usage:
//!   pipeline-runner --input online_retail.csv
//!   pipeline-runner --input lines.csv --config pipeline.json --db rfm.db
//!   pipeline-runner --input lines.csv --partitions 4 --as-of "2011-12-10 00:00:00"
//!   pipeline-runner --input lines.csv --summary-json summary.json

use anyhow::{bail, Context, Result};
use rfm_core::{
    record::parse_timestamp, segment::Segment, Pipeline, PipelineConfig, PipelineOutput,
    PipelineStore, RawLine,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(input) = flag_value(&args, "--input") else {
        bail!("usage: pipeline-runner --input <lines.csv> [--config <file.json>] [--db <path>]");
    };
    let db = flag_value(&args, "--db").unwrap_or(":memory:");

    let mut config = match flag_value(&args, "--config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    config.partitions = parse_arg(&args, "--partitions", config.partitions);
    if let Some(text) = flag_value(&args, "--as-of") {
        let as_of = parse_timestamp(text).with_context(|| format!("Cannot parse --as-of {text:?}"))?;
        config.as_of = Some(as_of);
    }

    println!("RFM pipeline-runner");
    println!("  input:       {input}");
    println!("  db:          {db}");
    println!("  bins:        {}", config.bin_count);
    println!("  partitions:  {}", config.partitions);
    println!();

    let (raw, unreadable) = read_lines(input)?;
    if unreadable > 0 {
        log::warn!("runner: {unreadable} CSV rows could not be decoded");
    }

    let pipeline = Pipeline::new(config)?;
    let output = pipeline.run(&raw)?;

    let store = PipelineStore::open(db)?;
    store.migrate()?;
    let run_id = uuid::Uuid::new_v4().to_string();
    store.insert_run(&run_id, env!("CARGO_PKG_VERSION"))?;
    store.publish(&run_id, &output)?;

    print_summary(&store, &run_id, &output)?;

    if let Some(path) = flag_value(&args, "--summary-json") {
        let json = serde_json::to_string_pretty(&output.summary)?;
        std::fs::write(path, json).with_context(|| format!("Cannot write {path}"))?;
        println!("  summary written to {path}");
    }
    Ok(())
}

/// Read every CSV row as a `RawLine`. Rows that cannot be decoded at all
/// are kept as empty lines so the cleaner counts them as schema violations.
fn read_lines(path: &str) -> Result<(Vec<RawLine>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Cannot open {path}"))?;
    let headers = reader.headers()?.clone();

    let mut lines = Vec::new();
    let mut unreadable = 0usize;
    for result in reader.byte_records() {
        let record = match result {
            Ok(bytes) => csv::StringRecord::from_byte_record_lossy(bytes),
            Err(e) => {
                log::debug!("runner: unreadable row, {e}");
                unreadable += 1;
                lines.push(RawLine::default());
                continue;
            }
        };
        match record.deserialize::<RawLine>(Some(&headers)) {
            Ok(line) => lines.push(line),
            Err(e) => {
                log::debug!("runner: row does not match the header, {e}");
                unreadable += 1;
                lines.push(RawLine::default());
            }
        }
    }
    log::info!("runner: {} rows read from {path}", lines.len());
    Ok((lines, unreadable))
}

fn print_summary(store: &PipelineStore, run_id: &str, output: &PipelineOutput) -> Result<()> {
    let summary = &output.summary;
    let published = store.customer_metrics_count(run_id)?;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {run_id}");
    println!("  input rows:      {}", summary.input_rows);
    println!("  cleaned rows:    {}", summary.cleaned_rows);
    println!("  retention:       {:.2}%", summary.retention_rate);
    println!("  total revenue:   {}", summary.total_revenue);
    println!("  customers:       {published}");
    match output.reference_date {
        Some(reference) => println!("  reference date:  {reference}"),
        None => println!("  reference date:  (none)"),
    }

    println!();
    println!("=== EXCLUSIONS ===");
    for (rule, removed) in store.exclusion_counts(run_id)? {
        println!("  {rule:<24} {removed}");
    }

    println!();
    println!("=== SEGMENTS ===");
    for segment in Segment::ALL {
        let count = summary.segments.count(segment);
        let share = if summary.customers > 0 {
            count as f64 / summary.customers as f64 * 100.0
        } else {
            0.0
        };
        println!("  {:<20} {count:>7}  ({share:.1}%)", segment.label());
    }
    if summary.segments.fallback > 0 {
        println!("  ({} via fallback)", summary.segments.fallback);
    }

    println!();
    println!("=== TOP COUNTRIES ===");
    for c in output.countries.iter().take(5) {
        println!("  {:<20} {:>14}  {:>6.2}%", c.country, c.total_revenue.to_string(), c.revenue_pct);
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
