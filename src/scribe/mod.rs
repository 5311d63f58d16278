// src/scribe/mod.rs

pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod event;
pub mod input;
pub mod orchestrator;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tools;

// Let's explicitly export SessionOrchestrator so we don't have to access it via
// scribe::orchestrator::SessionOrchestrator and instead as scribe::SessionOrchestrator
pub use orchestrator::SessionOrchestrator;
