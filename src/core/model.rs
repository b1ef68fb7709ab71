//! Records exchanged with the contest platform's data store

use serde::{Deserialize, Serialize};

use crate::core::verdict::Verdict;
use crate::languages::Language;
use crate::protocol::CheckerSpec;

/// A contestant's submission, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSubmission {
    pub language: Language,
    /// Base64-encoded source, or the answer text for output-only submissions
    pub code: String,
    pub time_limit_ms: u64,
    pub memory_limit_bytes: u64,
}

/// How a problem's testcases are judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Batch,
    Interactive,
    OutputOnly,
}

/// Testcase payload, stored inline or as a blob-store key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Inline(String),
    Blob(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestcaseRecord {
    pub id: u64,
    pub input: Payload,
    #[serde(default)]
    pub output: Option<Payload>,
}

/// All-or-nothing scoring group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: u64,
    pub score: u32,
    #[serde(default)]
    pub is_sample: bool,
    pub testcases: Vec<TestcaseRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub id: u64,
    #[serde(default)]
    pub mode: EvaluationMode,
    #[serde(default)]
    pub checker: Option<CheckerSpec>,
    pub clusters: Vec<ClusterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestcaseSubmission {
    pub testcase_id: u64,
    pub verdict: Verdict,
    pub time_ms: u64,
    pub memory_kb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSubmission {
    pub cluster_id: u64,
    pub verdict: Verdict,
    pub score: u32,
    pub testcases: Vec<TestcaseSubmission>,
}

/// Judged submission, written once with all of its clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: u64,
    pub problem_id: u64,
    pub verdict: Verdict,
    pub score: u32,
    pub max_time_ms: u64,
    pub max_memory_kb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_output: Option<String>,
    pub clusters: Vec<ClusterSubmission>,
}
