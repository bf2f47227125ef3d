//! Type definitions for manifests, records and the catalog document

mod catalog;
mod manifest;
mod record;

pub use catalog::*;
pub use manifest::*;
pub use record::*;
