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

//! Deadline-aware deployment of static build output to object storage.
//!
//! Layout: `model.rs` (invocation and action types), `deadline.rs` (budget and
//! early-report monitor), `enumerate.rs`/`batch.rs`/`transfer.rs` (file walk,
//! priority batching, concurrent transfers), `executor.rs` (per-action work and
//! verification), `pipeline.rs` (ordered action state machine), `reporter.rs`
//! (callback delivery), `handler.rs` (one invocation end to end).

pub mod batch;
pub mod deadline;
pub mod enumerate;
pub mod error;
pub mod executor;
pub mod finalize;
pub mod handler;
pub mod model;
pub mod patch;
pub mod pipeline;
pub mod reporter;
pub mod store;
pub mod transfer;

pub use batch::{Batch, BatchPlan, batch_size, is_priority_asset, plan, plan_with_size};
pub use deadline::{DEFAULT_BUFFER, DEFAULT_CHECK_INTERVAL, DeadlineBudget, DeadlineMonitor};
pub use enumerate::{Enumeration, enumerate_files};
pub use error::{DeliveryError, DeployError, DeployResult};
pub use executor::{ActionExecutor, ActionReport, verify_counts};
pub use handler::{HandlerSettings, InvocationHandler, InvocationReport, ReportDelivery};
pub use model::{
    Action, ActionKind, DeploymentMode, DeploymentRequest, InvocationContext, LifecycleEvent,
    RequestType,
};
pub use patch::{ContentPatch, PatchState};
pub use pipeline::{DeploymentPipeline, PipelineOutcome, PipelineState};
pub use reporter::{
    CallbackTransport, HttpCallbackTransport, ReportToken, ResponseEnvelope, ResponseIdentity,
    ResponseReporter, ResponseStatus, RetryPolicy,
};
pub use store::{
    BlobStore, ObjectPath, ObjectStoreBlobs, StaticStoreResolver, StoreResolver, object_key,
    parse_key,
};
pub use transfer::{ProgressTracker, TransferTally, run_batch};
