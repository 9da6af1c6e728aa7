//! Solution playback.
//!
//! Playback is a small state machine over [`SessionState`]:
//! - `Stopped` → `play` → `Playing` (display board reset to the edited board)
//! - `Playing` → `pause` → `Paused` → `play` → `Playing` (resumes in place)
//! - any → `stop` → `Stopped` (cursor 0, display board reset)
//!
//! While `Playing`, every [`tick`] applies one move of the solution. The tick
//! that applies the last move returns to `Stopped` with the cursor at 0 and
//! leaves the final position on display.
//!
//! The transitions are pure functions; [`PlaybackScheduler`] only produces
//! the tick cadence on a background thread.

use crate::session::{Mode, SessionState};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const TICK_PERIOD: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[must_use]
pub fn play(state: &SessionState) -> SessionState {
    let mut next = state.clone();
    if state.playback == PlaybackStatus::Stopped {
        next.playback_board = state.board.clone();
        next.playback_position = 0;
    }
    next.playback = PlaybackStatus::Playing;
    next
}

#[must_use]
pub fn pause(state: &SessionState) -> SessionState {
    let mut next = state.clone();
    if state.playback == PlaybackStatus::Playing {
        next.playback = PlaybackStatus::Paused;
    }
    next
}

#[must_use]
pub fn stop(state: &SessionState) -> SessionState {
    SessionState {
        playback: PlaybackStatus::Stopped,
        playback_position: 0,
        playback_board: state.board.clone(),
        ..state.clone()
    }
}

/// Advance playback by one move. A no-op unless the session is `Solved` and
/// playing.
#[must_use]
pub fn tick(state: &SessionState) -> SessionState {
    let mut next = state.clone();
    if state.mode != Mode::Solved || state.playback != PlaybackStatus::Playing {
        return next;
    }
    let Some(solution) = state.solution.as_deref() else {
        return next;
    };

    if let Some(step) = solution.chars().nth(state.playback_position) {
        if !next.playback_board.move_player(step) {
            log::warn!(
                "Solution move {step:?} at {} does not apply to the board",
                state.playback_position
            );
        }
        next.playback_position += 1;
    }
    if next.playback_position >= solution.chars().count() {
        next.playback = PlaybackStatus::Stopped;
        next.playback_position = 0;
    }
    next
}

/// Background ticker calling `on_tick` every period until stopped, dropped,
/// or `on_tick` returns false.
pub struct PlaybackScheduler {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackScheduler {
    pub fn start<F>(period: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("playback-ticker".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !on_tick() {
                                break;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("Playback ticker thread panicked");
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const LEVEL: &str = "\
######
#    #
#@ $ #
#  . #
######
";
    const SOLVED: &str = "\
######
#    #
#  @ #
#  * #
######
";

    fn solved_session(solution: &str) -> SessionState {
        let board = Board::from_xsb(LEVEL);
        SessionState {
            mode: Mode::Solved,
            playback_board: board.clone(),
            board,
            solution: Some(solution.to_string()),
            ..SessionState::default()
        }
    }

    #[test]
    fn test_four_ticks_play_the_whole_solution() {
        let mut state = solved_session("urrD");
        assert_eq!(state.playback, PlaybackStatus::Stopped);

        state = play(&state);
        assert_eq!(state.playback, PlaybackStatus::Playing);

        let mut positions = Vec::new();
        for _ in 0..4 {
            state = tick(&state);
            positions.push(state.playback_position);
        }
        assert_eq!(positions, vec![1, 2, 3, 0]);
        assert_eq!(state.playback, PlaybackStatus::Stopped);
        assert_eq!(state.playback_board.to_xsb(), SOLVED);

        // Stopped playback ignores further ticks.
        assert_eq!(tick(&state), state);
    }

    #[test]
    fn test_pause_freezes_and_play_resumes_in_place() {
        let mut state = play(&solved_session("urrD"));
        state = tick(&state);
        state = tick(&state);
        state = pause(&state);
        assert_eq!(state.playback, PlaybackStatus::Paused);

        let paused = state.clone();
        state = tick(&state);
        assert_eq!(state, paused);

        state = play(&state);
        assert_eq!(state.playback_position, 2);
        assert_eq!(state.playback_board, paused.playback_board);
        state = tick(&state);
        state = tick(&state);
        assert_eq!(state.playback_board.to_xsb(), SOLVED);
    }

    #[test]
    fn test_stop_restores_presolve_board() {
        let mut state = play(&solved_session("urrD"));
        state = tick(&state);
        state = tick(&state);
        state = stop(&state);
        assert_eq!(state.playback, PlaybackStatus::Stopped);
        assert_eq!(state.playback_position, 0);
        assert_eq!(state.playback_board, state.board);
    }

    #[test]
    fn test_play_after_auto_stop_restarts_from_presolve_board() {
        let mut state = play(&solved_session("urrD"));
        for _ in 0..4 {
            state = tick(&state);
        }
        assert_eq!(state.playback_board.to_xsb(), SOLVED);

        state = play(&state);
        assert_eq!(state.playback_board, state.board);
        assert_eq!(state.playback_position, 0);
    }

    #[test]
    fn test_tick_outside_solved_mode_is_noop() {
        let mut state = play(&solved_session("urrD"));
        state.mode = Mode::Edit;
        assert_eq!(tick(&state), state);
    }

    #[test]
    fn test_empty_solution_stops_on_first_tick() {
        let state = play(&solved_session(""));
        let state = tick(&state);
        assert_eq!(state.playback, PlaybackStatus::Stopped);
        assert_eq!(state.playback_position, 0);
    }

    #[test]
    fn test_scheduler_ticks_until_callback_declines() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let mut scheduler = PlaybackScheduler::start(Duration::from_millis(5), move || {
            ticks.fetch_add(1, Ordering::SeqCst) + 1 < 3
        })
        .expect("ticker starts");

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_scheduler_stops_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let scheduler = PlaybackScheduler::start(Duration::from_secs(60), move || {
            ticks.fetch_add(1, Ordering::SeqCst);
            true
        })
        .expect("ticker starts");

        let started = Instant::now();
        drop(scheduler);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
