use crate::board::Board;
use crate::error::SolveError;
use crate::solver::{CancelToken, DEFAULT_TIME_LIMIT_SECS, SolveOrchestrator, SolveOutcome};
use clap::Parser;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Environment variable naming the engine executable.
pub const ENGINE_ENV: &str = "FESTIVAL_ENGINE";
const ENGINE_NAME: &str = "festival";

/// Sokoban level editor driving the Festival solver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// XSB level file to open
    pub level: Option<PathBuf>,

    /// Festival executable (default: $FESTIVAL_ENGINE, then `festival`)
    #[arg(short = 'e', long = "engine")]
    pub engine: Option<PathBuf>,

    /// Solver time budget in seconds
    #[arg(short = 't', long = "time", default_value_t = DEFAULT_TIME_LIMIT_SECS)]
    pub time: u32,

    /// Solve once and print the result instead of opening the editor
    #[arg(long)]
    pub headless: bool,

    /// Write log records to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

#[must_use]
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Pick the engine executable: explicit flag, then `$FESTIVAL_ENGINE`, then
/// `festival` in the user executable directory, then `festival` on `PATH`.
#[must_use]
pub fn resolve_engine(explicit: Option<PathBuf>) -> PathBuf {
    resolve_engine_from(
        explicit,
        std::env::var_os(ENGINE_ENV),
        dirs::executable_dir(),
    )
}

fn resolve_engine_from(
    explicit: Option<PathBuf>,
    env: Option<OsString>,
    executable_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Some(value) = env.filter(|value| !value.is_empty()) {
        return PathBuf::from(value);
    }
    executable_dir
        .map(|dir| dir.join(ENGINE_NAME))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(ENGINE_NAME))
}

/// Read an XSB level file. Lines that are not board rows are skipped.
pub fn load_level(path: &Path) -> io::Result<Board> {
    let text = fs::read_to_string(path)?;
    Ok(Board::from_xsb(&text))
}

/// Solve `board` without the terminal UI, printing every progress board and
/// the final result to `out`.
pub fn run_headless<W: Write>(
    orchestrator: &SolveOrchestrator,
    board: &Board,
    time_limit_secs: u32,
    out: &mut W,
) -> Result<SolveOutcome, SolveError> {
    writeln!(
        out,
        "Solving with {} ({time_limit_secs}s budget)",
        orchestrator.engine().display()
    )?;
    write!(out, "{board}")?;

    let mut frames = 0usize;
    let mut write_error = None;
    let outcome = orchestrator.solve(board, time_limit_secs, &CancelToken::new(), |latest| {
        frames += 1;
        if write_error.is_none()
            && let Err(error) = write!(out, "\nProgress {frames}:\n{latest}")
        {
            write_error = Some(error);
        }
    })?;
    if let Some(error) = write_error {
        return Err(error.into());
    }

    match &outcome {
        SolveOutcome::Solved(solution) => {
            writeln!(out, "\nSolution: {}", solution.moves())?;
            writeln!(
                out,
                "Moves: {}, pushes: {}",
                solution.move_count(),
                solution.push_count()
            )?;
            let mut replay = board.clone();
            if replay.move_sequence(solution.moves()) {
                write!(out, "{replay}")?;
            } else {
                log::warn!("Solution does not replay on the submitted board");
            }
        }
        SolveOutcome::NoSolution => writeln!(out, "\nNo solution found.")?,
        SolveOutcome::Cancelled => writeln!(out, "\nCancelled.")?,
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::test_support::{ENGINE_LOCK, fake_engine, frame_script};

    #[test]
    fn test_parse_cli_defaults() {
        let cli = Cli::try_parse_from(["festival-tui"]).expect("valid arguments");
        assert_eq!(cli.level, None);
        assert_eq!(cli.engine, None);
        assert_eq!(cli.time, 600);
        assert!(!cli.headless);
        assert_eq!(cli.log_file, None);
    }

    #[test]
    fn test_parse_cli_with_options() {
        let cli = Cli::try_parse_from([
            "festival-tui",
            "levels/one.sok",
            "-e",
            "/opt/festival/festival",
            "--time",
            "30",
            "--headless",
            "--log-file",
            "/tmp/festival.log",
        ])
        .expect("valid arguments");
        assert_eq!(cli.level, Some(PathBuf::from("levels/one.sok")));
        assert_eq!(cli.engine, Some(PathBuf::from("/opt/festival/festival")));
        assert_eq!(cli.time, 30);
        assert!(cli.headless);
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/festival.log")));
    }

    #[test]
    fn test_parse_cli_rejects_bad_time() {
        assert!(Cli::try_parse_from(["festival-tui", "-t", "soon"]).is_err());
        assert!(Cli::try_parse_from(["festival-tui", "-t", "-5"]).is_err());
    }

    #[test]
    fn test_resolve_engine_order() {
        let dir = tempfile::tempdir().expect("tempdir");

        let explicit = resolve_engine_from(
            Some(PathBuf::from("/bin/custom")),
            Some(OsString::from("/env/festival")),
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(explicit, PathBuf::from("/bin/custom"));

        let from_env = resolve_engine_from(
            None,
            Some(OsString::from("/env/festival")),
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(from_env, PathBuf::from("/env/festival"));

        // Empty directory and empty variable fall through to PATH lookup.
        let fallback = resolve_engine_from(None, Some(OsString::new()), Some(dir.path().to_path_buf()));
        assert_eq!(fallback, PathBuf::from("festival"));

        let installed = dir.path().join("festival");
        fs::write(&installed, "").expect("create engine file");
        let from_dir = resolve_engine_from(None, None, Some(dir.path().to_path_buf()));
        assert_eq!(from_dir, installed);
    }

    #[test]
    fn test_load_level_skips_titles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("level.sok");
        fs::write(&path, "Title: Tiny\n\n#####\n#@$.#\n#####\nAuthor: nobody\n").expect("write level");

        let board = load_level(&path).expect("level loads");
        assert_eq!(board.to_xsb(), "#####\n#@$.#\n#####\n");
    }

    #[test]
    fn test_load_level_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = load_level(&dir.path().join("absent.sok")).expect_err("missing file");
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_headless_prints_progress_and_solution() {
        let _lock = ENGINE_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().expect("tempdir");
        let body = format!("{}\nprintf 'Solution\\nR\\n' > \"$7\"\n", frame_script(1));
        let engine = fake_engine(dir.path(), &body);

        let board = Board::from_xsb("#####\n#@$.#\n#####\n");
        let mut out = Vec::new();
        let outcome = run_headless(&SolveOrchestrator::new(&engine), &board, 5, &mut out)
            .expect("headless solve");
        assert!(matches!(outcome, SolveOutcome::Solved(_)));

        let text = String::from_utf8(out).expect("utf-8 output");
        assert!(text.contains("(5s budget)"), "{text}");
        assert!(text.contains("Progress 1:\n####\n#@ #\n####\n"), "{text}");
        assert!(text.contains("Solution: R\nMoves: 1, pushes: 1\n"), "{text}");
        assert!(text.ends_with("#####\n# @*#\n#####\n"), "{text}");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_headless_without_solution() {
        let _lock = ENGINE_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = fake_engine(dir.path(), "exit 0\n");

        let mut out = Vec::new();
        let outcome = run_headless(
            &SolveOrchestrator::new(&engine),
            &Board::from_xsb("#####\n#@$.#\n#####\n"),
            5,
            &mut out,
        )
        .expect("headless solve");
        assert_eq!(outcome, SolveOutcome::NoSolution);
        assert!(String::from_utf8_lossy(&out).ends_with("No solution found.\n"));
    }
}
