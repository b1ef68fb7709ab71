//! Testcase Sequencer
//!
//! Testcases of one cluster run strictly one after another in id order.
//! Once a testcase is not accepted, the rest of its cluster is skipped.
//! Different clusters share nothing and run concurrently.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::debug;

use crate::core::verdict::EvaluationResult;
use crate::protocol::TestcaseSpec;

/// Judges a single testcase. Failures are expressed as verdicts.
#[async_trait]
pub trait TestcaseJudge: Send + Sync {
    async fn judge(&self, testcase: &TestcaseSpec) -> EvaluationResult;
}

/// Judge one cluster. Results come back in the order of `testcases`.
pub async fn run_sequence<J>(judge: &J, testcases: &[&TestcaseSpec]) -> Vec<EvaluationResult>
where
    J: TestcaseJudge + ?Sized,
{
    let mut order: Vec<usize> = (0..testcases.len()).collect();
    order.sort_by_key(|&i| testcases[i].id);

    let mut results: Vec<Option<EvaluationResult>> = vec![None; testcases.len()];
    let mut proceed = true;

    for i in order {
        let testcase = testcases[i];
        let result = if proceed {
            let result = judge.judge(testcase).await;
            proceed = result.allows_continuation();
            result
        } else {
            EvaluationResult::Skipped
        };
        debug!(testcase = testcase.id, verdict = %result.verdict(), "testcase judged");
        results[i] = Some(result);
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or(EvaluationResult::Skipped))
        .collect()
}

/// Judge every cluster of a job; testcases without a cluster form one group.
/// Results come back in request order, one per testcase.
pub async fn run_clusters<J>(judge: &J, testcases: &[TestcaseSpec]) -> Vec<EvaluationResult>
where
    J: TestcaseJudge + ?Sized,
{
    let mut clusters: BTreeMap<Option<u64>, Vec<usize>> = BTreeMap::new();
    for (i, testcase) in testcases.iter().enumerate() {
        clusters.entry(testcase.cluster).or_default().push(i);
    }

    let runs = clusters.into_values().map(|indices| async move {
        let members: Vec<&TestcaseSpec> = indices.iter().map(|&i| &testcases[i]).collect();
        let results = run_sequence(judge, &members).await;
        indices.into_iter().zip(results).collect::<Vec<_>>()
    });

    let mut results: Vec<Option<EvaluationResult>> = vec![None; testcases.len()];
    for (i, result) in join_all(runs).await.into_iter().flatten() {
        results[i] = Some(result);
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or(EvaluationResult::Skipped))
        .collect()
}
