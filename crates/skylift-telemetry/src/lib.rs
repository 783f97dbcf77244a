#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Telemetry primitives shared across the Skylift workspace.
//!
//! Layout: `init.rs` (subscriber setup), `payload.rs` (debug payload dumps),
//! `metrics.rs` (Prometheus counters), `error.rs` (telemetry errors).

pub mod error;
pub mod init;
pub mod metrics;
pub mod payload;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{
    DEFAULT_LOG_LEVEL, DEBUG_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging,
    log_format_from_str,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use payload::debug_payload;
