pub mod breaker;
pub mod config;
pub mod filename;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod source;
pub mod worker;
