use sokoban_festival::board::Board;
use sokoban_festival::cli::{load_level, parse_cli, resolve_engine, run_headless};
use sokoban_festival::logging::{default_log_path, init_logging};
use sokoban_festival::session::{Session, SessionState};
use sokoban_festival::solver::{SolveOrchestrator, SolveOutcome};
use sokoban_festival::tui::TuiApp;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = parse_cli();

    // The editor owns the terminal, so its logs go to a file by default.
    let log_file = if cli.headless {
        cli.log_file.clone()
    } else {
        cli.log_file.clone().or_else(default_log_path)
    };
    if let Err(e) = init_logging(log_file.as_deref()) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let board = match &cli.level {
        Some(path) => match load_level(path) {
            Ok(board) => board,
            Err(e) => {
                eprintln!("Failed to load level from '{}': {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Board::empty(),
    };
    let orchestrator = SolveOrchestrator::new(resolve_engine(cli.engine.clone()));

    if cli.headless {
        let stdout = io::stdout();
        return match run_headless(&orchestrator, &board, cli.time, &mut stdout.lock()) {
            Ok(SolveOutcome::Solved(_)) => ExitCode::SUCCESS,
            Ok(_) => ExitCode::from(2),
            Err(e) => {
                eprintln!("Solve failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut initial = SessionState::with_board(board);
    initial.solver_timeout = cli.time;
    let session = Session::new(orchestrator, initial);
    let result = TuiApp::new(session).and_then(TuiApp::run);
    match result {
        Ok(exported) => {
            if let Some(text) = exported {
                print!("{text}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Terminal error: {e}");
            ExitCode::FAILURE
        }
    }
}
