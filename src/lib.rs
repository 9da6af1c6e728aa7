// Library interface for sokoban-festival
// The binary and the integration tests both build on these modules

pub mod board;
pub mod cli;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod playback;
pub mod session;
pub mod solver;
pub mod tui;

#[cfg(test)]
mod test_support;

// Re-export commonly used items for easier testing
pub use board::{Board, Direction, EditTool, MAX_BOARD_SIZE, Tile};
pub use decoder::BoardStream;
pub use error::{DecodeError, SolveError};
pub use playback::{PlaybackScheduler, PlaybackStatus};
pub use session::{Mode, Session, SessionState};
pub use solver::{CancelToken, Solution, SolveOrchestrator, SolveOutcome, parse_solution_file};
