//! Timestamp helpers
//!
//! All catalog and record timestamps use the compact ISO-8601 form
//! `YYYY-MM-DDTHH:MM:SSZ`. HTTP `Last-Modified` headers arrive in the
//! RFC 2822 form and are converted on ingestion.

use chrono::{DateTime, Utc};

/// Format a datetime as the catalog's ISO-8601 representation
pub fn iso_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Current time in the catalog's ISO-8601 representation
pub fn now_timestamp() -> String {
    iso_timestamp(Utc::now())
}

/// Parse an HTTP `Last-Modified` header value
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
