pub mod build;
pub mod controller;
pub mod history;

pub use build::{BuildResult, BuildRunner, ShellBuildRunner};
pub use controller::{QaController, QaRequest, QaResult, QaState};
pub use history::{QaAttempt, QaHistory, QaOutcome};
