//! # Pulsar Common Library
//!
//! Shared code for the Pulsar production manager:
//! - Error types
//! - Settings service (per-user JSON settings file)
//! - Event types, project snapshots and the EventBus
//! - Filesystem capability consumed by the path resolvers
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod sse;

pub use error::{Error, Result};
