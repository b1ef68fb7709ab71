//! Worker-side evaluation of Batch, Interactive and OutputOnly jobs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use tracing::{error, info, warn};

use crate::components::checker::{compare_output, SimpleChecker};
use crate::components::interactive::InteractiveJudge;
use crate::config::EngineLimits;
use crate::core::verdict::{ErrorVerdict, EvaluationResult, SuccessVerdict};
use crate::engine::compiler::{CheckerCache, CompileOutcome, Compiler};
use crate::engine::executer::{Executer, RunState, Runnable};
use crate::engine::timer::{Deadline, WallClock};
use crate::jobs::sequencer::{run_clusters, TestcaseJudge};
use crate::languages::{Language, LanguageTable};
use crate::protocol::{CheckerSpec, EvaluationJob, EvaluationResponse, TestcaseSpec};

/// How a program's answers are judged
#[derive(Debug, Clone, Copy)]
pub enum Judging<'a> {
    /// Plain output comparison
    Diff,
    Simple(&'a CheckerSpec),
    Interactive(&'a CheckerSpec),
}

/// Per-testcase results of one job, in request order
#[derive(Debug)]
pub struct JudgedSet {
    pub results: Vec<EvaluationResult>,
    pub compiler_output: Option<String>,
}

impl JudgedSet {
    fn uniform(testcases: &[TestcaseSpec], result: EvaluationResult) -> Self {
        Self {
            results: vec![result; testcases.len()],
            compiler_output: None,
        }
    }
}

/// Limits for one program, as given by the job
#[derive(Debug, Clone, Copy)]
pub struct ProgramLimits {
    pub time_limit: Duration,
    pub memory_limit_kb: u64,
}

pub struct Evaluator {
    compiler: Arc<Compiler>,
    checkers: CheckerCache,
    programs: Executer,
    simple: SimpleChecker,
    interactive: InteractiveJudge,
    limits: EngineLimits,
}

impl Evaluator {
    pub fn new(languages: Arc<LanguageTable>, scratch_root: impl Into<PathBuf>, limits: EngineLimits) -> Self {
        Self::with_deadline(languages, scratch_root, limits, Arc::new(WallClock))
    }

    /// Contestant programs are timed by `deadline`; checkers and compilers
    /// always use the wall clock.
    pub fn with_deadline(
        languages: Arc<LanguageTable>,
        scratch_root: impl Into<PathBuf>,
        limits: EngineLimits,
        deadline: Arc<dyn Deadline>,
    ) -> Self {
        let compiler = Arc::new(Compiler::new(languages, scratch_root, &limits));
        let programs = Executer::new(deadline, &limits);
        let trusted = Executer::wall_clock(&limits);

        Self {
            checkers: CheckerCache::new(compiler.clone()),
            compiler,
            simple: SimpleChecker::new(trusted, limits.checker_timeout),
            interactive: InteractiveJudge::new(programs.clone(), limits.interactive_grace),
            programs,
            limits,
        }
    }

    pub fn languages(&self) -> &LanguageTable {
        self.compiler.languages()
    }

    pub async fn evaluate(&self, job: &EvaluationJob) -> EvaluationResponse {
        let judged = match job {
            EvaluationJob::Batch(batch) => {
                let judging = match &batch.checker {
                    Some(checker) => Judging::Simple(checker),
                    None => Judging::Diff,
                };
                self.judge_program(
                    batch.language,
                    &batch.code,
                    &batch.testcases,
                    program_limits(batch.time_limit, batch.memory_limit),
                    judging,
                )
                .await
            }
            EvaluationJob::Interactive(job) => {
                self.judge_program(
                    job.language,
                    &job.code,
                    &job.testcases,
                    program_limits(job.time_limit, job.memory_limit),
                    Judging::Interactive(&job.checker),
                )
                .await
            }
            EvaluationJob::OutputOnly(job) => {
                self.judge_output(&job.output, &job.testcase, job.checker.as_ref())
                    .await
            }
        };

        EvaluationResponse::from_results(
            job.evaluation_id(),
            job.testcases(),
            &judged.results,
            judged.compiler_output,
        )
    }

    /// Compile once, then judge every testcase.
    pub async fn judge_program(
        &self,
        language: Language,
        code: &str,
        testcases: &[TestcaseSpec],
        limits: ProgramLimits,
        judging: Judging<'_>,
    ) -> JudgedSet {
        let source = match general_purpose::STANDARD.decode(code.trim()) {
            Ok(source) => source,
            Err(e) => {
                warn!("Rejecting source that is not valid base64: {}", e);
                return JudgedSet::uniform(
                    testcases,
                    EvaluationResult::error(
                        ErrorVerdict::EvaluationError,
                        format!("Source is not valid base64: {}", e),
                    ),
                );
            }
        };

        let program = match self.compiler.compile(language, &source).await {
            CompileOutcome::Success(program) => program,
            CompileOutcome::Failure { stderr } => {
                info!(%language, "Compilation failed");
                let mut set = JudgedSet::uniform(
                    testcases,
                    EvaluationResult::error(ErrorVerdict::CompilationError, stderr.clone()),
                );
                set.compiler_output = Some(stderr);
                return set;
            }
        };
        info!(%language, "Compilation succeeded");

        let results = match judging {
            Judging::Diff => {
                let judge = BatchJudge {
                    executer: &self.programs,
                    program: &program,
                    checker: None,
                    limits,
                    preview_limit: self.limits.output_preview_limit,
                };
                run_clusters(&judge, testcases).await
            }
            Judging::Simple(spec) => {
                let checker = match self.checker(spec).await {
                    Ok(checker) => checker,
                    Err(result) => return JudgedSet::uniform(testcases, result),
                };
                let judge = BatchJudge {
                    executer: &self.programs,
                    program: &program,
                    checker: Some((&self.simple, &checker)),
                    limits,
                    preview_limit: self.limits.output_preview_limit,
                };
                run_clusters(&judge, testcases).await
            }
            Judging::Interactive(spec) => {
                let checker = match self.checker(spec).await {
                    Ok(checker) => checker,
                    Err(result) => return JudgedSet::uniform(testcases, result),
                };
                let judge = InteractiveCase {
                    judge: &self.interactive,
                    program: &program,
                    checker: &checker,
                    limits,
                };
                run_clusters(&judge, testcases).await
            }
        };

        JudgedSet {
            results,
            compiler_output: None,
        }
    }

    /// Judge submitted answer text directly; no program runs.
    pub async fn judge_output(
        &self,
        output: &str,
        testcase: &TestcaseSpec,
        checker: Option<&CheckerSpec>,
    ) -> JudgedSet {
        let testcases = std::slice::from_ref(testcase);
        let answer = match general_purpose::STANDARD.decode(output.trim()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                return JudgedSet::uniform(
                    testcases,
                    EvaluationResult::error(
                        ErrorVerdict::EvaluationError,
                        format!("Output is not valid base64: {}", e),
                    ),
                )
            }
        };

        let checker = match checker {
            Some(spec) => match self.checker(spec).await {
                Ok(checker) => Some(checker),
                Err(result) => return JudgedSet::uniform(testcases, result),
            },
            None => None,
        };

        let judge = OutputOnlyJudge {
            answer: &answer,
            checker: checker.as_ref().map(|c| (&self.simple, c)),
            preview_limit: self.limits.output_preview_limit,
        };
        JudgedSet {
            results: run_clusters(&judge, testcases).await,
            compiler_output: None,
        }
    }

    async fn checker(&self, spec: &CheckerSpec) -> Result<Runnable, EvaluationResult> {
        self.checkers.get_or_compile(spec).await.map_err(|stderr| {
            error!("Checker compilation failed: {}", stderr);
            EvaluationResult::error(
                ErrorVerdict::SystemError,
                format!("Checker compilation failed: {}", stderr),
            )
        })
    }
}

pub fn program_limits(time_limit_ms: u64, memory_limit_kb: u64) -> ProgramLimits {
    ProgramLimits {
        time_limit: Duration::from_millis(time_limit_ms),
        memory_limit_kb,
    }
}

fn preview(output: &str, limit: usize) -> String {
    output.chars().take(limit).collect()
}

fn compare_expected(
    answer: &str,
    expected: Option<&str>,
    time_ms: u64,
    memory_kb: u64,
    output: String,
) -> EvaluationResult {
    match expected {
        Some(expected) => EvaluationResult::Success {
            verdict: if compare_output(answer, expected) {
                SuccessVerdict::Accepted
            } else {
                SuccessVerdict::WrongAnswer
            },
            time_ms,
            memory_kb,
            output: Some(output),
        },
        None => EvaluationResult::error(
            ErrorVerdict::EvaluationError,
            "Testcase has neither an expected output nor a checker",
        ),
    }
}

struct BatchJudge<'a> {
    executer: &'a Executer,
    program: &'a Runnable,
    checker: Option<(&'a SimpleChecker, &'a Runnable)>,
    limits: ProgramLimits,
    preview_limit: usize,
}

#[async_trait]
impl TestcaseJudge for BatchJudge<'_> {
    async fn judge(&self, testcase: &TestcaseSpec) -> EvaluationResult {
        let outcome = match self
            .executer
            .run_limited(
                self.program,
                testcase.input.as_bytes(),
                self.limits.time_limit,
                Some(self.limits.memory_limit_kb),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(testcase = testcase.id, "Failed to run program: {}", e);
                return EvaluationResult::error(
                    ErrorVerdict::SystemError,
                    format!("Failed to run program: {}", e),
                );
            }
        };

        let time_limit_ms = self.limits.time_limit.as_millis() as u64;
        if outcome.timed_out() || outcome.elapsed_ms > time_limit_ms {
            return EvaluationResult::Success {
                verdict: SuccessVerdict::TimeLimitExceeded,
                time_ms: time_limit_ms,
                memory_kb: outcome.peak_memory_kb,
                output: None,
            };
        }
        if outcome.memory_exceeded() || outcome.peak_memory_kb > self.limits.memory_limit_kb {
            return EvaluationResult::Success {
                verdict: SuccessVerdict::MemoryLimitExceeded,
                time_ms: outcome.elapsed_ms,
                memory_kb: outcome.peak_memory_kb,
                output: None,
            };
        }
        if let RunState::Crashed { exit_code } = outcome.status {
            return EvaluationResult::Error {
                verdict: ErrorVerdict::RuntimeError,
                exit_code: Some(exit_code),
                message: Some(outcome.stderr),
            };
        }

        let shown = preview(&outcome.stdout, self.preview_limit);
        match self.checker {
            Some((checker, runnable)) => match checker
                .check(
                    runnable,
                    &testcase.input,
                    testcase.output.as_deref(),
                    &outcome.stdout,
                )
                .await
            {
                Ok(decision) => {
                    decision.into_result(outcome.elapsed_ms, outcome.peak_memory_kb, Some(shown))
                }
                Err(e) => {
                    error!(testcase = testcase.id, "Failed to run checker: {}", e);
                    EvaluationResult::error(
                        ErrorVerdict::SystemError,
                        format!("Failed to run checker: {}", e),
                    )
                }
            },
            None => compare_expected(
                &outcome.stdout,
                testcase.output.as_deref(),
                outcome.elapsed_ms,
                outcome.peak_memory_kb,
                shown,
            ),
        }
    }
}

struct InteractiveCase<'a> {
    judge: &'a InteractiveJudge,
    program: &'a Runnable,
    checker: &'a Runnable,
    limits: ProgramLimits,
}

#[async_trait]
impl TestcaseJudge for InteractiveCase<'_> {
    async fn judge(&self, testcase: &TestcaseSpec) -> EvaluationResult {
        match self
            .judge
            .judge(
                self.program,
                self.checker,
                &testcase.input,
                self.limits.time_limit,
                self.limits.memory_limit_kb,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(testcase = testcase.id, "Interactive session failed: {}", e);
                EvaluationResult::error(
                    ErrorVerdict::SystemError,
                    format!("Interactive session failed: {}", e),
                )
            }
        }
    }
}

struct OutputOnlyJudge<'a> {
    answer: &'a str,
    checker: Option<(&'a SimpleChecker, &'a Runnable)>,
    preview_limit: usize,
}

#[async_trait]
impl TestcaseJudge for OutputOnlyJudge<'_> {
    async fn judge(&self, testcase: &TestcaseSpec) -> EvaluationResult {
        let shown = preview(self.answer, self.preview_limit);
        match self.checker {
            Some((checker, runnable)) => match checker
                .check(runnable, &testcase.input, testcase.output.as_deref(), self.answer)
                .await
            {
                Ok(decision) => decision.into_result(0, 0, Some(shown)),
                Err(e) => EvaluationResult::error(
                    ErrorVerdict::SystemError,
                    format!("Failed to run checker: {}", e),
                ),
            },
            None => compare_expected(self.answer, testcase.output.as_deref(), 0, 0, shown),
        }
    }
}
