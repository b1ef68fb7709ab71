//! Compiler Selector
//!
//! Turns a (language, source) pair into a [`Runnable`]. Compiled languages go
//! through their toolchain in a fresh scratch directory; interpreted ones
//! are written out and run directly.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::EngineLimits;
use crate::engine::executer::{Executer, RunOutcome, RunState, Runnable};
use crate::languages::{Language, LanguageTable};
use crate::protocol::CheckerSpec;

/// Result of a compilation attempt
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Success(Runnable),
    Failure { stderr: String },
}

impl CompileOutcome {
    fn failure(stderr: impl Into<String>) -> Self {
        CompileOutcome::Failure {
            stderr: stderr.into(),
        }
    }
}

pub struct Compiler {
    languages: Arc<LanguageTable>,
    scratch_root: PathBuf,
    executer: Executer,
    compile_timeout: Duration,
}

impl Compiler {
    pub fn new(
        languages: Arc<LanguageTable>,
        scratch_root: impl Into<PathBuf>,
        limits: &EngineLimits,
    ) -> Self {
        Self {
            languages,
            scratch_root: scratch_root.into(),
            executer: Executer::wall_clock(limits),
            compile_timeout: limits.compile_timeout,
        }
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    /// Compile `source`. Never fails: every problem becomes a
    /// [`CompileOutcome::Failure`] carrying a message for the contestant.
    pub async fn compile(&self, language: Language, source: &[u8]) -> CompileOutcome {
        let config = match self.languages.get(language) {
            Some(config) => config,
            None => return CompileOutcome::failure(format!("Unsupported language: {}", language)),
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.scratch_root).await {
            return CompileOutcome::failure(format!("Failed to create scratch directory: {}", e));
        }
        let scratch = match tempfile::Builder::new()
            .prefix("judge-")
            .tempdir_in(&self.scratch_root)
        {
            Ok(dir) => dir,
            Err(e) => {
                return CompileOutcome::failure(format!("Failed to create scratch directory: {}", e))
            }
        };

        let source_path = scratch.path().join(&config.source_file);
        if let Err(e) = tokio::fs::write(&source_path, source).await {
            return CompileOutcome::failure(format!("Failed to write source file: {}", e));
        }

        let compile_cmd = match &config.compile_command {
            Some(cmd) => cmd,
            None => {
                debug!(%language, "interpreted language, skipping compilation");
                return CompileOutcome::Success(Runnable::in_scratch(
                    config.run_command.clone(),
                    scratch,
                ));
            }
        };

        debug!(%language, command = ?compile_cmd, "compiling");
        let compiler = Runnable::new(compile_cmd.clone(), scratch.path());
        match self.executer.run(&compiler, b"", self.compile_timeout).await {
            Ok(outcome) if outcome.status == RunState::Completed => {
                CompileOutcome::Success(Runnable::in_scratch(config.run_command.clone(), scratch))
            }
            Ok(outcome) => CompileOutcome::failure(compile_error_message(&outcome)),
            Err(e) => {
                warn!(%language, "failed to run compiler: {}", e);
                CompileOutcome::failure(format!("Failed to run compiler: {}", e))
            }
        }
    }
}

/// Compiler diagnostics: stderr, then stdout, then a status summary.
fn compile_error_message(outcome: &RunOutcome) -> String {
    if !outcome.stderr.is_empty() {
        outcome.stderr.clone()
    } else if !outcome.stdout.is_empty() {
        outcome.stdout.clone()
    } else {
        match outcome.status {
            RunState::TimedOut => "Compilation timed out".to_string(),
            RunState::Crashed { exit_code } => {
                format!("Compilation failed with exit code {}", exit_code)
            }
            _ => "Compilation failed".to_string(),
        }
    }
}

/// Distinct checkers kept compiled at once
pub const CHECKER_CACHE_CAPACITY: usize = 64;

type CheckerSlot = Arc<OnceCell<Runnable>>;

#[derive(Default)]
struct CheckerSlots {
    slots: HashMap<String, CheckerSlot>,
    /// Keys, oldest first
    order: VecDeque<String>,
}

/// Compiled checkers keyed by the SHA-256 of their language and source.
///
/// Each key owns a cell, so a slow build only holds up callers of that same
/// checker. Past `capacity` the oldest entry is dropped; its scratch
/// directory goes away once no running judge still holds it.
pub struct CheckerCache {
    compiler: Arc<Compiler>,
    capacity: usize,
    compiled: Mutex<CheckerSlots>,
}

impl CheckerCache {
    pub fn new(compiler: Arc<Compiler>) -> Self {
        Self::with_capacity(compiler, CHECKER_CACHE_CAPACITY)
    }

    pub fn with_capacity(compiler: Arc<Compiler>, capacity: usize) -> Self {
        Self {
            compiler,
            capacity: capacity.max(1),
            compiled: Mutex::new(CheckerSlots::default()),
        }
    }

    async fn slot(&self, key: &str) -> CheckerSlot {
        let mut compiled = self.compiled.lock().await;
        if let Some(slot) = compiled.slots.get(key) {
            return slot.clone();
        }

        while compiled.order.len() >= self.capacity {
            match compiled.order.pop_front() {
                Some(oldest) => {
                    debug!(key = %&oldest[..12], "evicting checker");
                    compiled.slots.remove(&oldest);
                }
                None => break,
            }
        }
        let slot = CheckerSlot::default();
        compiled.slots.insert(key.to_string(), slot.clone());
        compiled.order.push_back(key.to_string());
        slot
    }

    /// Get the checker program, compiling it on first use.
    ///
    /// Returns the compiler diagnostics when the checker does not build. A
    /// failed build is not cached.
    pub async fn get_or_compile(&self, checker: &CheckerSpec) -> Result<Runnable, String> {
        let key = checker_key(checker);
        let slot = self.slot(&key).await;
        if let Some(runnable) = slot.get() {
            debug!(key = %&key[..12], "checker cache hit");
            return Ok(runnable.clone());
        }

        slot.get_or_try_init(|| async {
            info!(language = %checker.language, "compiling checker");
            match self
                .compiler
                .compile(checker.language, checker.script.as_bytes())
                .await
            {
                CompileOutcome::Success(runnable) => Ok(runnable),
                CompileOutcome::Failure { stderr } => Err(stderr),
            }
        })
        .await
        .cloned()
    }
}

fn checker_key(checker: &CheckerSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(checker.language.name().as_bytes());
    hasher.update([0u8]);
    hasher.update(checker.script.as_bytes());
    format!("{:x}", hasher.finalize())
}
