pub mod backend;
pub mod config;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod workspace;
