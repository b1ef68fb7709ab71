//! Verdict Aggregator
//!
//! Folds per-testcase reports into cluster verdicts and scores, and those
//! into the submission's verdict and score.

use std::collections::HashMap;

use crate::core::model::{ClusterSubmission, ProblemRecord, SubmissionRecord, TestcaseSubmission};
use crate::core::verdict::Verdict;
use crate::protocol::{EvaluationResponse, TestcaseReport};

fn testcase_submission(id: u64, report: Option<&TestcaseReport>) -> TestcaseSubmission {
    match report {
        Some(report) => TestcaseSubmission {
            testcase_id: id,
            verdict: report.verdict.clone(),
            time_ms: report.time,
            memory_kb: report.memory,
            error: report.error.clone(),
        },
        None => TestcaseSubmission {
            testcase_id: id,
            verdict: Verdict::EvaluationError,
            time_ms: 0,
            memory_kb: 0,
            error: Some("No result returned for testcase".to_string()),
        },
    }
}

/// Build the judged submission for `problem` from a worker's response.
pub fn aggregate(
    problem: &ProblemRecord,
    submission_id: u64,
    response: &EvaluationResponse,
) -> SubmissionRecord {
    let reports: HashMap<u64, &TestcaseReport> =
        response.testcases.iter().map(|r| (r.id, r)).collect();

    let clusters: Vec<ClusterSubmission> = problem
        .clusters
        .iter()
        .map(|cluster| {
            let mut ids: Vec<u64> = cluster.testcases.iter().map(|t| t.id).collect();
            ids.sort_unstable();

            let testcases: Vec<TestcaseSubmission> = ids
                .iter()
                .map(|id| testcase_submission(*id, reports.get(id).copied()))
                .collect();

            let verdict = testcases
                .iter()
                .map(|t| &t.verdict)
                .find(|v| !v.is_accepting())
                .cloned()
                .unwrap_or(Verdict::Accepted);

            let solved = testcases.iter().all(|t| t.verdict.is_accepting());
            let score = if solved && !cluster.is_sample {
                cluster.score
            } else {
                0
            };

            ClusterSubmission {
                cluster_id: cluster.id,
                verdict,
                score,
                testcases,
            }
        })
        .collect();

    let verdict = if response.testcases.is_empty() {
        Verdict::EvaluationError
    } else if response.verdict == Verdict::CompilationError {
        Verdict::CompilationError
    } else {
        clusters
            .iter()
            .map(|c| &c.verdict)
            .find(|v| **v != Verdict::Accepted)
            .cloned()
            .unwrap_or(Verdict::Accepted)
    };

    SubmissionRecord {
        id: submission_id,
        problem_id: problem.id,
        verdict,
        score: clusters.iter().map(|c| c.score).sum(),
        max_time_ms: response.max_time,
        max_memory_kb: response.max_memory,
        compiler_output: response.compiler_output.clone(),
        clusters,
    }
}
