//! rfm-core: cleaning, enrichment, aggregation and RFM segmentation of
//! e-commerce transaction lines.
//!
//! The crate receives a loaded record set plus a `PipelineConfig` and returns
//! every output table by value. Loading raw files, CLI parsing and logging
//! setup live in the `pipeline-runner` binary.

pub mod aggregate;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod features;
pub mod outlier;
pub mod pipeline;
pub mod record;
pub mod rfm;
pub mod segment;
pub mod store;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, PipelineOutput};
pub use record::{RawLine, TransactionLine};
pub use segment::Segment;
pub use store::PipelineStore;
pub use types::{CustomerId, Money};
