//! Dyn-O-Tool: bulk operations on DynamoDB tables.
//!
//! Every bulk command is a composition of four pieces:
//! - `scanner::PaginatedScanner` walks a table (or one segment of it)
//!   page by page, backing off on throttling;
//! - `batch::BatchWriter` / `batch::BatchDeleter` submit mutations in
//!   bounded batches until the service has applied all of them;
//! - `codec` converts between the service's tagged wire form and the
//!   plain output formats;
//! - `orchestrator::TransferOrchestrator` sequences them into export,
//!   import, copy, truncate and friends.
//!
//! The database, object store and function invoker are collaborator
//! traits with AWS (`aws`) and in-process (`memory`) implementations.

pub mod admin;
pub mod aws;
pub mod batch;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod scanner;
pub mod stats;
pub mod target;
pub mod types;

pub use client::TableClient;
pub use codec::{OutputFormat, UnencodablePolicy};
pub use config::DynotoolConfig;
pub use error::{DynoError, Result};
pub use orchestrator::{CopyMode, ExportMode, TransferOrchestrator, TransferSettings};
pub use progress::{DotProgress, Phase, ProgressSink, SilentProgress};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use stats::TransferStats;
pub use target::Target;
pub use types::{PlainRecord, PlainValue, TableSchema, TaggedRecord, TaggedValue};
