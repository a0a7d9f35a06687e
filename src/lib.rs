pub mod agents;
pub mod audit;
pub mod cli;
pub mod config;
pub mod errors;
pub mod feed;
pub mod git;
pub mod pipeline;
pub mod prompts;
pub mod qa;
pub mod utils;
