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

//! Binary entrypoint that handles one lifecycle event and reports its status.

use skylift_app::{AppResult, run_app};

/// Runs a single invocation to completion.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
