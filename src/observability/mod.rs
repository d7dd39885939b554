//! # Observability Infrastructure
//!
//! Structured logging for a rotation run.

pub mod logging;

pub use logging::{init_logging, LogFormat};
