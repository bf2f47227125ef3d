//! Signing pipeline for Granary
//!
//! Walks the format trees of unsigned package records, produces a
//! detached SHA-384 signature for every artifact we host, and records
//! per-record completion so a rerun is a safe no-op.

pub mod orchestrator;
pub mod signer;

pub use orchestrator::{FormatOutcome, SigningOrchestrator};
pub use signer::{ContentSigner, OpensslSigner, StaticSigner};
