//! Observability for trackdex
//!
//! Structured JSON logging only. Logging is read-only: it never alters
//! indexing behaviour, and a failed log write is silently dropped.
//!
//! ```ignore
//! use trackdex::observability::Logger;
//!
//! Logger::info("INDEX_START", &[("buckets", "3")]);
//! ```

mod logger;

pub use logger::{min_severity, set_min_severity, Logger, Severity};
