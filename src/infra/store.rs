//! Key-value persistence for problems and judged submissions

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::model::{ProblemRecord, SubmissionRecord};
use crate::error::StoreError;

/// Redis key layout
pub mod keys {
    pub const PROBLEM_PREFIX: &str = "judge:problem:";
    pub const SUBMISSION_PREFIX: &str = "judge:submission:";

    pub fn problem(id: u64) -> String {
        format!("{}{}", PROBLEM_PREFIX, id)
    }

    pub fn submission(id: u64) -> String {
        format!("{}{}", SUBMISSION_PREFIX, id)
    }

    pub fn submission_cluster(id: u64, cluster_id: u64) -> String {
        format!("{}{}:cluster:{}", SUBMISSION_PREFIX, id, cluster_id)
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn load_problem(&self, problem_id: u64) -> Result<ProblemRecord, StoreError>;

    /// Write a judged submission and all of its clusters in one step.
    async fn save_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError>;
}

/// Records stored as JSON strings in Redis
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

#[async_trait]
impl DataStore for RedisStore {
    async fn load_problem(&self, problem_id: u64) -> Result<ProblemRecord, StoreError> {
        let key = keys::problem(problem_id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(raw) => decode(&key, &raw),
            None => Err(StoreError::NotFound(format!("problem {}", problem_id))),
        }
    }

    async fn save_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let key = keys::submission(record.id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for cluster in &record.clusters {
            let cluster_key = keys::submission_cluster(record.id, cluster.cluster_id);
            pipe.set(&cluster_key, encode(&cluster_key, cluster)?).ignore();
        }
        // The submission row goes last so readers never see it without its clusters
        pipe.set(&key, encode(&key, record)?).ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        debug!(submission = record.id, "submission saved");
        Ok(())
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    problems: Mutex<HashMap<u64, ProblemRecord>>,
    submissions: Mutex<HashMap<u64, SubmissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_problem(&self, problem: ProblemRecord) {
        self.problems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(problem.id, problem);
    }

    pub fn submission(&self, id: u64) -> Option<SubmissionRecord> {
        self.submissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn load_problem(&self, problem_id: u64) -> Result<ProblemRecord, StoreError> {
        self.problems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&problem_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("problem {}", problem_id)))
    }

    async fn save_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.submissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.id, record.clone());
        Ok(())
    }
}
