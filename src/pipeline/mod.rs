pub mod controller;
pub mod outcome;
pub mod phase;
pub mod review;
pub mod state;

pub use controller::{Collaborators, PipelineController};
pub use outcome::{CandidateOutcome, CandidateRecord, RunSummary, StopReason};
pub use state::{Clock, PipelineConfig, RunState, SystemClock};
