//! Process Runner
//!
//! Runs one program to completion (or to its deadline) with an input buffer,
//! capturing stdout/stderr while a [`MemorySampler`] tracks its peak memory.
//! Each run walks an explicit state machine:
//! `Idle -> Running -> {Completed, TimedOut, MemoryExceeded, Crashed}`.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitid, Id, WaitPidFlag};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::EngineLimits;
use crate::engine::memory::MemorySampler;
use crate::engine::timer::{Deadline, WallClock};
use crate::error::ExecError;

/// How long readers may keep draining pipes after the process is gone
const READER_GRACE: Duration = Duration::from_secs(1);

/// A program ready to run: a command line and the directory it runs in.
#[derive(Debug, Clone)]
pub struct Runnable {
    pub command: Vec<String>,
    pub work_dir: PathBuf,
    /// Keeps the compile scratch directory alive for as long as the program is
    scratch: Option<Arc<TempDir>>,
}

impl Runnable {
    pub fn new(
        command: impl IntoIterator<Item = impl Into<String>>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            work_dir: work_dir.into(),
            scratch: None,
        }
    }

    pub fn in_scratch(command: Vec<String>, scratch: TempDir) -> Self {
        Self {
            command,
            work_dir: scratch.path().to_path_buf(),
            scratch: Some(Arc::new(scratch)),
        }
    }

    /// Program path; `./name` is resolved against the working directory.
    fn program(&self) -> Result<PathBuf, ExecError> {
        let program = self.command.first().ok_or(ExecError::EmptyCommand)?;
        Ok(match program.strip_prefix("./") {
            Some(local) => self.work_dir.join(local),
            None => PathBuf::from(program),
        })
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { pid: u32 },
    Completed,
    TimedOut,
    MemoryExceeded,
    Crashed { exit_code: i32 },
}

#[derive(Debug, Clone, Copy)]
pub enum RunEvent {
    Spawned(u32),
    Exited(i32),
    DeadlineHit,
    MemoryLimitHit,
}

impl RunState {
    pub fn on(self, event: RunEvent) -> RunState {
        match (self, event) {
            (RunState::Idle, RunEvent::Spawned(pid)) => RunState::Running { pid },
            (RunState::Running { .. }, RunEvent::Exited(0)) => RunState::Completed,
            (RunState::Running { .. }, RunEvent::Exited(exit_code)) => {
                RunState::Crashed { exit_code }
            }
            (RunState::Running { .. }, RunEvent::DeadlineHit) => RunState::TimedOut,
            (RunState::Running { .. }, RunEvent::MemoryLimitHit) => RunState::MemoryExceeded,
            (state, _) => state,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunState::Completed
                | RunState::TimedOut
                | RunState::MemoryExceeded
                | RunState::Crashed { .. }
        )
    }
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunState,
    /// Wall time; equals the timeout when the run was killed
    pub elapsed_ms: u64,
    pub peak_memory_kb: u64,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    /// A run killed at one of its limits still counts as a success here;
    /// the caller turns it into a limit verdict.
    pub fn success(&self) -> bool {
        matches!(
            self.status,
            RunState::Completed | RunState::TimedOut | RunState::MemoryExceeded
        )
    }

    pub fn timed_out(&self) -> bool {
        self.status == RunState::TimedOut
    }

    pub fn memory_exceeded(&self) -> bool {
        self.status == RunState::MemoryExceeded
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            RunState::Crashed { exit_code } => Some(exit_code),
            RunState::Completed => Some(0),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Executer {
    deadline: Arc<dyn Deadline>,
    poll_interval: Duration,
    capture_limit: usize,
}

impl Executer {
    pub fn new(deadline: Arc<dyn Deadline>, limits: &EngineLimits) -> Self {
        Self {
            deadline,
            poll_interval: limits.memory_poll_interval,
            capture_limit: limits.output_capture_limit,
        }
    }

    pub fn wall_clock(limits: &EngineLimits) -> Self {
        Self::new(Arc::new(WallClock), limits)
    }

    pub fn deadline(&self) -> &Arc<dyn Deadline> {
        &self.deadline
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn capture_limit(&self) -> usize {
        self.capture_limit
    }

    /// Run `runnable` with `input` on stdin, killing it after `timeout`.
    ///
    /// Errors only when the process could not be driven at all; crashes and
    /// timeouts are reported through [`RunOutcome::status`].
    pub async fn run(
        &self,
        runnable: &Runnable,
        input: &[u8],
        timeout: Duration,
    ) -> Result<RunOutcome, ExecError> {
        self.run_limited(runnable, input, timeout, None).await
    }

    /// Like [`run`](Self::run), also killing the process as soon as its
    /// resident memory goes over `memory_limit_kb`.
    pub async fn run_limited(
        &self,
        runnable: &Runnable,
        input: &[u8],
        timeout: Duration,
        memory_limit_kb: Option<u64>,
    ) -> Result<RunOutcome, ExecError> {
        let mut state = RunState::Idle;
        let mut child = spawn(runnable, true)?;
        let pid = match child.id() {
            Some(pid) => pid,
            None => return Err(ExecError::MissingPid),
        };
        state = state.on(RunEvent::Spawned(pid));
        debug!(pid, command = ?runnable.command, "process started");

        let mut sampler = MemorySampler::with_limit(pid, self.poll_interval, memory_limit_kb);
        let started = Instant::now();

        let writer = {
            let stdin = child.stdin.take();
            let input = input.to_vec();
            tokio::spawn(async move {
                if let Some(mut stdin) = stdin {
                    // The program may exit without reading its input
                    let _ = stdin.write_all(&input).await;
                    let _ = stdin.shutdown().await;
                }
            })
        };
        let stdout = spawn_reader(child.stdout.take(), self.capture_limit);
        let stderr = spawn_reader(child.stderr.take(), self.capture_limit);

        let waited: Result<RunEvent, ExecError> = tokio::select! {
            status = wait_and_clear_group(&mut child, pid) => {
                status.map(|s| RunEvent::Exited(exit_code(s))).map_err(ExecError::Wait)
            }
            _ = self.deadline.wait(timeout) => {
                kill_unreaped(&child);
                let _ = child.wait().await;
                Ok(RunEvent::DeadlineHit)
            }
            _ = sampler.exceeded() => {
                kill_unreaped(&child);
                let _ = child.wait().await;
                Ok(RunEvent::MemoryLimitHit)
            }
        };
        let elapsed = started.elapsed();

        let peak_memory_kb = sampler.stop().await;
        writer.abort();
        let stdout = join_reader(stdout).await;
        let stderr = join_reader(stderr).await;

        let event = waited?;
        state = state.on(event);
        trace!(pid, ?state, "process finished");

        let elapsed_ms = match state {
            RunState::TimedOut => timeout.as_millis() as u64,
            _ => elapsed.as_millis() as u64,
        };

        Ok(RunOutcome {
            status: state,
            elapsed_ms,
            peak_memory_kb,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

/// Spawn `runnable` in its own process group with piped stdin/stdout.
pub(crate) fn spawn(runnable: &Runnable, capture_stderr: bool) -> Result<Child, ExecError> {
    let program = runnable.program()?;
    let mut cmd = Command::new(&program);
    cmd.args(&runnable.command[1..])
        .current_dir(&runnable.work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(if capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .process_group(0)
        .kill_on_drop(true);

    cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.display().to_string(),
        source,
    })
}

/// SIGKILL the process group led by `pid`.
///
/// The caller must know the leader is not reaped yet; once it is, the pid
/// may already lead somebody else's group.
pub(crate) fn kill_group(pid: u32) {
    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        trace!(pid, %err, "killpg");
    }
}

/// SIGKILL the group of `child` unless tokio has already reaped it.
pub(crate) fn kill_unreaped(child: &Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
}

/// Wait for `child` to exit, kill what is left of its process group while
/// the exited leader still pins the group id, then reap it.
///
/// Leftover descendants would otherwise keep the pipes open.
pub(crate) async fn wait_and_clear_group(
    child: &mut Child,
    pid: u32,
) -> std::io::Result<ExitStatus> {
    match tokio::task::spawn_blocking(move || wait_exited(pid)).await {
        Ok(Ok(())) => kill_group(pid),
        Ok(Err(err)) => trace!(pid, %err, "waitid"),
        Err(err) => trace!(pid, %err, "waitid task"),
    }
    child.wait().await
}

/// Block until `pid` has exited, leaving it unreaped.
fn wait_exited(pid: u32) -> nix::Result<()> {
    loop {
        let id = Id::Pid(Pid::from_raw(pid as i32));
        match waitid(id, WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => continue,
            other => return other.map(drop),
        }
    }
}

/// Exit code, or `128 + signal` for a signalled process.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

fn spawn_reader<R>(reader: Option<R>, limit: usize) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match reader {
            Some(reader) => read_capped(reader, limit).await,
            None => Vec::new(),
        }
    })
}

async fn join_reader(mut handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}

/// Read to EOF keeping at most `limit` bytes; the rest is drained and dropped.
pub(crate) async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    buf
}
