pub mod agent_logger;
pub mod run_tracker;
pub mod session;
pub mod utils;
pub mod workflow_logger;

pub use agent_logger::AgentLogger;
pub use session::AuditSession;
