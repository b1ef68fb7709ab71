//! External services: job queue, record store, blob storage

pub mod queue;
pub mod storage;
pub mod store;
