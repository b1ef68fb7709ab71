//! Legacy HTTP contract served by a worker
//!
//! `POST /` judges a program against inline testcases with plain output
//! comparison and answers with one result per testcase.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::verdict::EvaluationResult;
use crate::jobs::evaluation::{program_limits, Evaluator, Judging};
use crate::languages::Language;
use crate::protocol::TestcaseSpec;

#[derive(Debug, Deserialize)]
pub struct HttpTestcase {
    pub id: u64,
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "out", default)]
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub language: String,
    /// Base64-encoded source
    pub code: String,
    /// Milliseconds
    pub time_limit: u64,
    /// KiB
    pub memory_limit: u64,
    pub testcases: Vec<HttpTestcase>,
}

#[derive(Debug, Serialize)]
pub struct TestcaseOutcome {
    pub id: u64,
    #[serde(flatten)]
    pub result: EvaluationResult,
}

pub fn router(evaluator: Arc<Evaluator>) -> Router {
    Router::new()
        .route("/", post(evaluate))
        .with_state(evaluator)
}

fn bad_request(message: String) -> Response {
    warn!("Rejecting HTTP evaluation: {}", message);
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// POST / - judge a program synchronously
pub async fn evaluate(State(evaluator): State<Arc<Evaluator>>, body: Bytes) -> Response {
    let request: EvaluateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("invalid request body: {}", e)),
    };
    let language = match evaluator.languages().resolve(&request.language) {
        Some(language) => language,
        None => return bad_request(format!("unsupported language: {}", request.language)),
    };

    let testcases: Vec<TestcaseSpec> = request
        .testcases
        .into_iter()
        .map(|tc| TestcaseSpec {
            id: tc.id,
            input: tc.input,
            output: tc.output,
            cluster: None,
        })
        .collect();
    info!(
        "HTTP evaluation: language={}, testcases={}",
        language.name(),
        testcases.len()
    );

    let judged = if language == Language::OutputOnly {
        match testcases.as_slice() {
            [testcase] => evaluator.judge_output(&request.code, testcase, None).await,
            _ => {
                return bad_request(format!(
                    "output-only answers need exactly one testcase, got {}",
                    testcases.len()
                ))
            }
        }
    } else {
        evaluator
            .judge_program(
                language,
                &request.code,
                &testcases,
                program_limits(request.time_limit, request.memory_limit),
                Judging::Diff,
            )
            .await
    };

    let outcomes: Vec<TestcaseOutcome> = testcases
        .iter()
        .zip(judged.results)
        .map(|(tc, result)| TestcaseOutcome { id: tc.id, result })
        .collect();
    (StatusCode::OK, Json(outcomes)).into_response()
}
