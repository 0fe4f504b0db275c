//! Epoch-driven submission loop.
//!
//! Turns wall-clock time into commit and reveal work: one loop iteration
//! per submit epoch, a commit job early in the submit window and a reveal
//! job after the submit deadline, both handed to the sequential action
//! queue. Assets without a usable price are skipped for the epoch, never
//! the whole batch.

pub mod clock;
pub mod error;
pub mod scheduler;
pub mod submit;

pub use clock::{Clock, SystemClock};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{SchedulerConfig, SubmissionScheduler};
pub use submit::{
    build_commit_batch, build_reveal_batch, AssetPipeline, CommitBatch, CommitEntry, RevealBatch,
};
