//! Failure tracking and alerting
//!
//! One aggregation run that produced checker errors is routine; many in
//! a row means something upstream is broken. The tracker keeps a
//! rolling failure count in the errors table and fires the alert sink
//! once per threshold crossing, then resets so the next crossing alerts
//! again.

use anyhow::Result;
use granary_core::time::now_timestamp;
use granary_core::types::{ErrorReport, TrackedError};
use granary_stores::RecordStore;
use std::sync::Arc;
use tracing::{error, info};

/// Destination for threshold alerts. Notification formatting and
/// delivery live behind this seam.
pub trait AlertSink: Send + Sync {
    fn alert(&self, reporter: &str, errors: &[TrackedError]);
}

/// Default sink: emits the report to the log
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, reporter: &str, errors: &[TrackedError]) {
        error!(
            "{} has failed {} consecutive runs:",
            reporter,
            errors.len().max(1)
        );
        for e in errors {
            error!("  [{}] {}", e.timestamp, e.message);
        }
    }
}

/// Rolling failure counter over the errors table
pub struct ErrorTracker {
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn AlertSink>,
    reporter: String,
    threshold: u32,
}

impl ErrorTracker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn AlertSink>,
        reporter: impl Into<String>,
        threshold: u32,
    ) -> Self {
        Self {
            store,
            sink,
            reporter: reporter.into(),
            threshold,
        }
    }

    /// Record the outcome of one run. Returns whether an alert fired.
    ///
    /// A clean run resets the counter. A failing run increments it and
    /// appends timestamped messages; strictly exceeding the threshold
    /// fires the sink once and resets the report.
    pub async fn commit(&self, errors: &[String]) -> Result<bool> {
        if errors.is_empty() {
            self.store
                .insert(ErrorReport::new(&self.reporter).to_value()?)
                .await?;
            return Ok(false);
        }

        let mut report = match self.store.get(&self.reporter).await? {
            Some(value) => ErrorReport::from_value(&value)?,
            None => ErrorReport::new(&self.reporter),
        };

        report.failures += 1;
        let timestamp = now_timestamp();
        for message in errors {
            report.errors.push(TrackedError {
                message: message.clone(),
                timestamp: timestamp.clone(),
            });
        }

        if report.failures > self.threshold {
            self.sink.alert(&self.reporter, &report.errors);
            self.store
                .insert(ErrorReport::new(&self.reporter).to_value()?)
                .await?;
            Ok(true)
        } else {
            info!(
                "{}: {} consecutive failed runs (threshold {})",
                self.reporter, report.failures, self.threshold
            );
            self.store.insert(report.to_value()?).await?;
            Ok(false)
        }
    }
}
