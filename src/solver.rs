//! Orchestration of the external Festival engine.
//!
//! A solve writes the board to a temporary level file, runs
//! `<engine> <level> -cores 1 -time <secs> -out_file <solution>`, forwards every
//! progress board decoded from the engine's stdout, and finally reads the move
//! string that follows the `Solution` line of the output file.
//!
//! The temporary files and the child process are owned by guards, so they are
//! released on every exit path: success, error and cancellation.

use crate::board::Board;
use crate::decoder::BoardStream;
use crate::error::SolveError;
use crate::{debug_log, info_log};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tempfile::{Builder, TempPath};
use wait_timeout::ChildExt;

pub const DEFAULT_TIME_LIMIT_SECS: u32 = 600;
const WAIT_SLICE: Duration = Duration::from_millis(50);
const SOLUTION_MARKER: &str = "Solution";

/// Move string found by the engine. Lower-case letters are plain moves,
/// upper-case letters are pushes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    moves: String,
}

impl Solution {
    pub fn new(moves: impl Into<String>) -> Self {
        Self {
            moves: moves.into(),
        }
    }

    #[must_use]
    pub fn moves(&self) -> &str {
        &self.moves
    }

    #[must_use]
    pub fn move_count(&self) -> usize {
        self.moves.chars().count()
    }

    #[must_use]
    pub fn push_count(&self) -> usize {
        self.moves.chars().filter(char::is_ascii_uppercase).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveOutcome {
    Solved(Solution),
    /// The engine finished without writing a solution (time budget spent,
    /// unsolvable level, malformed output file).
    NoSolution,
    Cancelled,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    child: Mutex<Option<Child>>,
}

/// Shared handle used to abort a running solve from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag the solve as cancelled and kill the engine if it is running.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(child) = self.child_slot().as_mut() {
            log::info!("Cancelling solve, killing engine pid {}", child.id());
            if let Err(error) = child.kill() {
                debug_log!("kill() after cancel failed: {}", error);
            }
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn child_slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.inner
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn has_child(&self) -> bool {
        self.child_slot().is_some()
    }
}

/// Owns the running engine through the token's slot; dropping it kills and
/// reaps the process.
struct ChildGuard<'a> {
    token: &'a CancelToken,
}

impl<'a> ChildGuard<'a> {
    fn attach(token: &'a CancelToken, child: Child) -> Self {
        *token.child_slot() = Some(child);
        // A cancel that raced with spawn found no child to kill.
        if token.is_cancelled() {
            token.cancel();
        }
        Self { token }
    }
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        let child = self.token.child_slot().take();
        if let Some(mut child) = child {
            if matches!(child.try_wait(), Ok(None)) {
                debug_log!("Engine still running during cleanup, killing it");
                if let Err(error) = child.kill() {
                    log::warn!("Failed to kill engine during cleanup: {error}");
                }
            }
            if let Err(error) = child.wait() {
                log::warn!("Failed to reap engine process: {error}");
            }
        }
    }
}

/// Runs the engine executable for one board at a time.
#[derive(Clone, Debug)]
pub struct SolveOrchestrator {
    engine: PathBuf,
}

impl SolveOrchestrator {
    pub fn new(engine: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// Solve `board` within `time_limit_secs`, calling `on_progress` with every
    /// board the engine reports while searching.
    ///
    /// Returns `Err` only for genuine failures. I/O errors observed after
    /// `token` was cancelled are expected (the engine was killed) and yield
    /// [`SolveOutcome::Cancelled`].
    pub fn solve<F>(
        &self,
        board: &Board,
        time_limit_secs: u32,
        token: &CancelToken,
        mut on_progress: F,
    ) -> Result<SolveOutcome, SolveError>
    where
        F: FnMut(Board),
    {
        let level_file = write_level_file(board)?;
        let solution_file = Builder::new()
            .prefix("level")
            .suffix(".output.sok.tmp")
            .tempfile()?
            .into_temp_path();

        let mut command = Command::new(&self.engine);
        command
            .arg(&*level_file)
            .args(["-cores", "1", "-time"])
            .arg(time_limit_secs.to_string())
            .arg("-out_file")
            .arg(&*solution_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        log::info!("Starting engine: {command:?}");

        let mut child = command.spawn().map_err(|source| SolveError::Spawn {
            program: self.engine.clone(),
            source,
        })?;
        let stdout = child.stdout.take();
        // Declared after the temp files so the process is gone before they
        // are deleted.
        let _guard = ChildGuard::attach(token, child);
        let stdout = stdout.ok_or_else(|| io::Error::other("engine stdout was not captured"))?;

        match run_engine(stdout, &solution_file, token, &mut on_progress) {
            Err(SolveError::Io(error)) if token.is_cancelled() => {
                log::warn!("Ignoring I/O error after cancellation: {error}");
                Ok(SolveOutcome::Cancelled)
            }
            result => result,
        }
    }
}

fn write_level_file(board: &Board) -> io::Result<TempPath> {
    let mut file = Builder::new().prefix("level").suffix(".sok.tmp").tempfile()?;
    file.write_all(board.to_xsb().as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

fn run_engine<F>(
    stdout: ChildStdout,
    solution_file: &Path,
    token: &CancelToken,
    on_progress: &mut F,
) -> Result<SolveOutcome, SolveError>
where
    F: FnMut(Board),
{
    for item in BoardStream::new(BufReader::new(stdout)) {
        if token.is_cancelled() {
            return Ok(SolveOutcome::Cancelled);
        }
        match item {
            Ok(board) => {
                debug_log!("Progress board:\n{}", board);
                on_progress(board);
            }
            Err(error) if error.is_io() && token.is_cancelled() => {
                log::warn!("Ignoring engine output error after cancellation: {error}");
                return Ok(SolveOutcome::Cancelled);
            }
            Err(error) => return Err(error.into()),
        }
    }

    wait_for_exit(token)?;
    if token.is_cancelled() {
        return Ok(SolveOutcome::Cancelled);
    }

    match read_solution(solution_file)? {
        Some(moves) => {
            let solution = Solution::new(moves);
            log::info!(
                "Solution found: {} moves, {} pushes",
                solution.move_count(),
                solution.push_count()
            );
            Ok(SolveOutcome::Solved(solution))
        }
        None => {
            log::info!("Engine finished without a solution");
            Ok(SolveOutcome::NoSolution)
        }
    }
}

/// Wait in short slices so `cancel()` can take the slot between them; a
/// cancellation seen here kills the engine directly.
fn wait_for_exit(token: &CancelToken) -> io::Result<()> {
    loop {
        let mut slot = token.child_slot();
        let Some(child) = slot.as_mut() else {
            return Ok(());
        };
        if token.is_cancelled() {
            let _ = child.kill();
        }
        if let Some(status) = child.wait_timeout(WAIT_SLICE)? {
            info_log!("Engine exited with {}", status);
            return Ok(());
        }
    }
}

fn read_solution(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(parse_solution_file(&String::from_utf8_lossy(&bytes))),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Extract the line following the last `Solution` line.
#[must_use]
pub fn parse_solution_file(contents: &str) -> Option<String> {
    let mut solution = None;
    let mut lines = contents.lines();
    while let Some(line) = lines.next() {
        if line == SOLUTION_MARKER
            && let Some(moves) = lines.next()
        {
            solution = Some(moves.to_string());
        }
    }
    solution
}
