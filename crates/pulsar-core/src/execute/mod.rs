//! Execution engine for Pulsar notebooks.
//!
//! # Pass protocol
//!
//! ```text
//! Notebook::begin_pass(changed)      bump generation, plan the closure
//!     │
//!     └── for each planned cell
//!             ├── Notebook::prepare   block on upstream failure, gather inputs
//!             ├── CellJob::run        no lock held; may run on any thread
//!             └── Notebook::commit    single writer; drops superseded results
//!     │
//! Notebook::finish(pass)            PassReport
//! ```
//!
//! # Drivers
//!
//! - **`LinearExecutor`** - one cell at a time, in plan order.
//! - **`ParallelExecutor`** - one dependency level at a time, the cells of a
//!   level run on the Rayon pool.
//! - **`Session`** (in [`crate::session`]) - async, on Tokio, with passes that
//!   supersede each other.

mod context;
mod executor;
mod parallel;
mod pass;

pub use context::{AbortHandle, ExecutionCallback};
pub use executor::LinearExecutor;
pub use parallel::ParallelExecutor;
pub use pass::{CellJob, CommitOutcome, JobOutcome, JobResult, Pass, PassReport, Prepared};
