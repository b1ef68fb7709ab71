//! Online judge evaluation engine
//!
//! Workers pull evaluation jobs from a shared queue, compile and run the
//! contestant's program against each testcase, and push per-testcase
//! verdicts back. The [`orchestrator`] submits jobs and aggregates the
//! responses into scored submissions.

pub mod components;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod http;
pub mod infra;
pub mod jobs;
pub mod languages;
pub mod orchestrator;
pub mod protocol;

#[cfg(test)]
mod test_support;
