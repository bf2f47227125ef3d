//! Core library for Granary
//!
//! Provides the typed manifest/catalog models, configuration loading,
//! error types and small time/MIME helpers shared by the aggregation
//! and signing crates.

pub mod config;
pub mod error;
pub mod mime;
pub mod time;
pub mod types;

pub use config::GranaryConfig;
pub use error::{Error, Result};
