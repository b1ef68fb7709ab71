//! Queue wire format shared by the orchestrator and judge workers
//!
//! Requests are pushed to the shared request queue as
//! `{"BeginEvaluation": {"output_queue": ..., "evaluation": {"Batch": {...}}}}`
//! and answered on `output_queue` with an [`EvaluationResponse`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::verdict::{EvaluationResult, Verdict};
use crate::languages::Language;

/// Checker program attached to a problem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckerSpec {
    pub script: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestcaseSpec {
    pub id: u64,
    pub input: String,
    /// Expected output; absent for checker-driven testcases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Scoring cluster; testcases without one form a single group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: u64,
    /// Base64-encoded source
    pub code: String,
    pub language: Language,
    pub testcases: Vec<TestcaseSpec>,
    /// Milliseconds
    pub time_limit: u64,
    /// KiB
    pub memory_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checker: Option<CheckerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveJob {
    pub id: u64,
    pub code: String,
    pub language: Language,
    pub testcases: Vec<TestcaseSpec>,
    pub time_limit: u64,
    pub memory_limit: u64,
    pub checker: CheckerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOnlyJob {
    pub id: u64,
    /// Base64-encoded answer text
    pub output: String,
    pub testcase: TestcaseSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checker: Option<CheckerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvaluationJob {
    Batch(BatchJob),
    Interactive(InteractiveJob),
    OutputOnly(OutputOnlyJob),
}

impl EvaluationJob {
    pub fn evaluation_id(&self) -> u64 {
        match self {
            EvaluationJob::Batch(job) => job.id,
            EvaluationJob::Interactive(job) => job.id,
            EvaluationJob::OutputOnly(job) => job.id,
        }
    }

    pub fn set_evaluation_id(&mut self, id: u64) {
        match self {
            EvaluationJob::Batch(job) => job.id = id,
            EvaluationJob::Interactive(job) => job.id = id,
            EvaluationJob::OutputOnly(job) => job.id = id,
        }
    }

    pub fn testcases(&self) -> &[TestcaseSpec] {
        match self {
            EvaluationJob::Batch(job) => &job.testcases,
            EvaluationJob::Interactive(job) => &job.testcases,
            EvaluationJob::OutputOnly(job) => std::slice::from_ref(&job.testcase),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationJob::Batch(_) => "batch",
            EvaluationJob::Interactive(_) => "interactive",
            EvaluationJob::OutputOnly(_) => "output_only",
        }
    }
}

/// Message on the shared request queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueMessage {
    BeginEvaluation {
        output_queue: String,
        evaluation: EvaluationJob,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestcaseReport {
    pub id: u64,
    pub verdict: Verdict,
    pub time: u64,
    pub memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TestcaseReport {
    pub fn from_result(id: u64, result: &EvaluationResult) -> Self {
        let verdict = result.verdict();
        match result {
            EvaluationResult::Success {
                time_ms,
                memory_kb,
                output,
                ..
            } => Self {
                id,
                verdict,
                time: *time_ms,
                memory: *memory_kb,
                exit_code: None,
                error: None,
                output: output.clone(),
            },
            EvaluationResult::Error {
                exit_code, message, ..
            } => Self {
                id,
                verdict,
                time: 0,
                memory: 0,
                exit_code: *exit_code,
                error: message.clone(),
                output: None,
            },
            EvaluationResult::Skipped => Self {
                id,
                verdict,
                time: 0,
                memory: 0,
                exit_code: None,
                error: None,
                output: None,
            },
        }
    }
}

/// Message a worker pushes to the requester's output queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub evaluation_id: u64,
    pub verdict: Verdict,
    pub max_time: u64,
    pub max_memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_output: Option<String>,
    pub testcases: Vec<TestcaseReport>,
}

impl EvaluationResponse {
    /// Build a response from per-testcase results given in request order.
    pub fn from_results(
        evaluation_id: u64,
        testcases: &[TestcaseSpec],
        results: &[EvaluationResult],
        compiler_output: Option<String>,
    ) -> Self {
        let reports: Vec<TestcaseReport> = testcases
            .iter()
            .zip(results)
            .map(|(tc, result)| TestcaseReport::from_result(tc.id, result))
            .collect();

        let verdict = if reports
            .iter()
            .any(|r| r.verdict == Verdict::CompilationError)
        {
            Verdict::CompilationError
        } else {
            reports
                .iter()
                .map(|r| &r.verdict)
                .find(|v| !v.is_accepting() && **v != Verdict::Skipped)
                .cloned()
                .unwrap_or(Verdict::Accepted)
        };

        Self {
            evaluation_id,
            verdict,
            max_time: reports.iter().map(|r| r.time).max().unwrap_or(0),
            max_memory: reports.iter().map(|r| r.memory).max().unwrap_or(0),
            compiler_output,
            testcases: reports,
        }
    }

    /// Structural checks applied to responses read off the queue.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.testcases.len());
        for tc in &self.testcases {
            if !seen.insert(tc.id) {
                return Err(format!("duplicate testcase id {}", tc.id));
            }
        }
        Ok(())
    }

    /// A top-level compilation error applies to every testcase.
    pub fn normalize(&mut self) {
        if self.verdict == Verdict::CompilationError {
            for tc in &mut self.testcases {
                tc.verdict = Verdict::CompilationError;
                if tc.error.is_none() {
                    tc.error = self.compiler_output.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verdict::{ErrorVerdict, SuccessVerdict};
    use serde_json::json;

    fn testcase(id: u64) -> TestcaseSpec {
        TestcaseSpec {
            id,
            input: format!("{}\n", id),
            output: Some(format!("{}\n", id)),
            cluster: None,
        }
    }

    #[test]
    fn test_batch_message_shape() {
        let message = QueueMessage::BeginEvaluation {
            output_queue: "judge:responses:1".into(),
            evaluation: EvaluationJob::Batch(BatchJob {
                id: 7,
                code: "cHJpbnQoMSk=".into(),
                language: Language::Python,
                testcases: vec![testcase(1)],
                time_limit: 1000,
                memory_limit: 262144,
                checker: None,
            }),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["BeginEvaluation"]["output_queue"], "judge:responses:1");
        let batch = &value["BeginEvaluation"]["evaluation"]["Batch"];
        assert_eq!(batch["id"], 7);
        assert_eq!(batch["language"], "python");
        assert_eq!(batch["testcases"][0], json!({"id": 1, "input": "1\n", "output": "1\n"}));
        assert!(batch.get("checker").is_none());
    }

    #[test]
    fn test_batch_roundtrip_preserves_testcase_order() {
        let ids = [5u64, 3, 9, 1];
        let job = EvaluationJob::Batch(BatchJob {
            id: 11,
            code: String::new(),
            language: Language::Cpp,
            testcases: ids.iter().map(|id| testcase(*id)).collect(),
            time_limit: 2000,
            memory_limit: 65536,
            checker: Some(CheckerSpec {
                script: "print('ac')".into(),
                language: Language::Python,
            }),
        });

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: EvaluationJob = serde_json::from_str(&encoded).unwrap();

        let decoded_ids: Vec<u64> = decoded.testcases().iter().map(|t| t.id).collect();
        assert_eq!(decoded_ids, ids);
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_response_parses_documented_shape() {
        let raw = json!({
            "evaluation_id": 42,
            "verdict": {"type": "wrong_answer"},
            "max_time": 120,
            "max_memory": 2048,
            "testcases": [
                {"id": 1, "verdict": {"type": "accepted"}, "time": 120, "memory": 2048},
                {"id": 2, "verdict": {"type": "wrong_answer"}, "time": 80, "memory": 1024, "output": "3"}
            ]
        });
        let response: EvaluationResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.evaluation_id, 42);
        assert_eq!(response.testcases[1].verdict, Verdict::WrongAnswer);
        assert!(response.validate().is_ok());
    }

    #[test]
    fn test_response_verdict_is_first_failure() {
        let testcases = vec![testcase(1), testcase(2), testcase(3)];
        let results = vec![
            EvaluationResult::Success {
                verdict: SuccessVerdict::Accepted,
                time_ms: 10,
                memory_kb: 100,
                output: None,
            },
            EvaluationResult::Success {
                verdict: SuccessVerdict::TimeLimitExceeded,
                time_ms: 1000,
                memory_kb: 300,
                output: None,
            },
            EvaluationResult::Skipped,
        ];

        let response = EvaluationResponse::from_results(9, &testcases, &results, None);
        assert_eq!(response.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(response.max_time, 1000);
        assert_eq!(response.max_memory, 300);
        assert_eq!(response.testcases.len(), 3);
        assert_eq!(response.testcases[2].verdict, Verdict::Skipped);
    }

    #[test]
    fn test_normalize_spreads_compilation_error() {
        let mut response = EvaluationResponse {
            evaluation_id: 1,
            verdict: Verdict::CompilationError,
            max_time: 0,
            max_memory: 0,
            compiler_output: Some("syntax error".into()),
            testcases: vec![TestcaseReport::from_result(1, &EvaluationResult::Skipped)],
        };
        response.normalize();
        assert_eq!(response.testcases[0].verdict, Verdict::CompilationError);
        assert_eq!(response.testcases[0].error.as_deref(), Some("syntax error"));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let result = EvaluationResult::error(ErrorVerdict::SystemError, "x");
        let response = EvaluationResponse::from_results(
            1,
            &[testcase(4), testcase(4)],
            &[result.clone(), result],
            None,
        );
        assert!(response.validate().is_err());
    }
}
