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

//! Skylift invocation wiring.
//!
//! Layout: `config.rs` (environment settings), `stores.rs` (S3 store resolution),
//! `bootstrap.rs` (event loading and handler wiring), `error.rs` (application errors).

/// Invocation bootstrap and event loading.
pub mod bootstrap;
/// Environment-derived settings.
pub mod config;
/// Application error types.
pub mod error;
/// Per-bucket S3 store resolution.
pub mod stores;

pub use bootstrap::run_app;
pub use config::DeployConfig;
pub use error::{AppError, AppResult};
pub use stores::S3StoreResolver;
