//! Error types at the library's seams.
//!
//! Contestant-caused failures never surface here: they are turned into
//! verdicts by the judging pipeline.

use std::io;

use thiserror::Error;

/// Failure to drive an OS process.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("cannot spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("process was spawned without a pid")]
    MissingPid,
    #[error("cannot wait for process: {0}")]
    Wait(io::Error),
    #[error("scratch directory: {0}")]
    Scratch(io::Error),
}

/// Queue transport failure.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("queue is disconnected")]
    Disconnected,
}

/// Persistence or blob fetch failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed record {key}: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("blob store: {0}")]
    Blob(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid job: {0}")]
    InvalidJob(String),
    #[error("cannot dispatch job: {0}")]
    Dispatch(#[from] QueueError),
    #[error("cannot encode job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("listener for evaluation {0} was dropped")]
    ListenerDropped(u64),
    #[error("no response for evaluation {0} before the deadline")]
    DeadlineExceeded(u64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
