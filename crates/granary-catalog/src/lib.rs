//! Catalog aggregation for Granary
//!
//! Merges every submitted package record into one catalog document,
//! gatekept by the consistency checker, and publishes it only when the
//! content actually changed. Repeated failures are tracked and alerted
//! on through the error reporter.

pub mod aggregator;
pub mod checker;
pub mod reporter;

pub use aggregator::{AggregationResponse, CatalogAggregator};
pub use checker::{ConsistencyChecker, FormatCheck};
pub use reporter::{AlertSink, ErrorTracker, LogAlertSink};
