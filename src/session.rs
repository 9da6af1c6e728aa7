//! Session state and its single owner.
//!
//! [`SessionState`] is an immutable snapshot. Every change, whether a user
//! edit, a progress board from the engine or a playback tick, is a
//! transformation `&SessionState -> SessionState` applied by [`Session`], the
//! only writer. Background work (the solve thread and the playback ticker)
//! never touches the state directly; it queues messages that the owner applies
//! in [`Session::pump`]. Observers receive every published snapshot through
//! [`Session::subscribe`].
//!
//! # Modes
//! - `Edit`: the board can be painted and pasted; `solve` starts the engine.
//! - `Solving`: the display board follows the engine's progress boards.
//! - `Solved`: the solution is replayed by the playback state machine.
//!
//! `cancel` returns to `Edit` from either of the other modes.

use crate::board::{Board, EditTool};
use crate::error::SolveError;
use crate::playback::{self, PlaybackScheduler, PlaybackStatus, TICK_PERIOD};
use crate::solver::{CancelToken, DEFAULT_TIME_LIMIT_SECS, SolveOrchestrator, SolveOutcome};
use crate::{debug_log, info_log};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Mode {
    #[default]
    Edit,
    Solving,
    Solved,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SessionState {
    pub mode: Mode,
    pub active_tool: EditTool,
    /// The board being edited; also the pre-solve snapshot for playback.
    pub board: Board,
    /// The board on display while solving or replaying.
    pub playback_board: Board,
    pub solution: Option<String>,
    pub playback_position: usize,
    pub playback: PlaybackStatus,
    /// Engine time budget in seconds.
    pub solver_timeout: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::with_board(Board::empty())
    }
}

impl SessionState {
    #[must_use]
    pub fn with_board(board: Board) -> Self {
        Self {
            mode: Mode::Edit,
            active_tool: EditTool::default(),
            playback_board: board.clone(),
            board,
            solution: None,
            playback_position: 0,
            playback: PlaybackStatus::Stopped,
            solver_timeout: DEFAULT_TIME_LIMIT_SECS,
        }
    }

    #[must_use]
    pub fn count_solution_moves(&self) -> usize {
        self.solution.as_deref().map_or(0, |s| s.chars().count())
    }

    #[must_use]
    pub fn count_solution_pushes(&self) -> usize {
        self.solution
            .as_deref()
            .map_or(0, |s| s.chars().filter(char::is_ascii_uppercase).count())
    }

    /// The board a viewer should show for the current mode.
    #[must_use]
    pub fn display_board(&self) -> &Board {
        match self.mode {
            Mode::Edit => &self.board,
            Mode::Solving | Mode::Solved => &self.playback_board,
        }
    }
}

pub type Transform = Box<dyn FnOnce(&SessionState) -> SessionState + Send>;

enum Message {
    Update(Transform),
    SolveFinished(Result<SolveOutcome, SolveError>),
}

struct SolveWorker {
    token: CancelToken,
    handle: JoinHandle<()>,
}

/// Owner of the session state.
pub struct Session {
    state: Arc<SessionState>,
    orchestrator: SolveOrchestrator,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    subscribers: Vec<Sender<Arc<SessionState>>>,
    solve: Option<SolveWorker>,
    ticker: Option<PlaybackScheduler>,
}

impl Session {
    pub fn new(orchestrator: SolveOrchestrator, initial: SessionState) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            state: Arc::new(initial),
            orchestrator,
            sender,
            receiver,
            subscribers: Vec::new(),
            solve: None,
            ticker: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Stream of published snapshots, starting with the current one.
    pub fn subscribe(&mut self) -> Receiver<Arc<SessionState>> {
        let (sender, receiver) = unbounded();
        let _ = sender.send(self.state());
        self.subscribers.push(sender);
        receiver
    }

    /// True while a solve thread has not yet reported back.
    #[must_use]
    pub fn is_solving(&self) -> bool {
        self.solve.is_some()
    }

    fn update(&mut self, transform: impl FnOnce(&SessionState) -> SessionState) -> bool {
        let next = transform(&self.state);
        if next == *self.state {
            return false;
        }
        self.state = Arc::new(next);
        let snapshot = &self.state;
        self.subscribers
            .retain(|subscriber| subscriber.send(Arc::clone(snapshot)).is_ok());
        true
    }

    /// Apply queued background messages.
    ///
    /// Waits up to `timeout` for the first message, then drains the queue.
    /// Returns whether the state changed, or the error of a solve that failed
    /// for reasons other than cancellation.
    pub fn pump(&mut self, timeout: Duration) -> Result<bool, SolveError> {
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return Ok(false),
        };
        let messages: Vec<Message> = std::iter::once(first)
            .chain(self.receiver.try_iter())
            .collect();

        let mut changed = false;
        let mut failure = None;
        for message in messages {
            match message {
                Message::Update(transform) => changed |= self.update(transform),
                Message::SolveFinished(result) => {
                    self.join_solve_worker();
                    match result {
                        Ok(outcome) => changed |= self.finish_solve(outcome),
                        Err(error) => {
                            log::error!("Solve failed: {error}");
                            changed |= self.update(return_to_edit);
                            failure = Some(error);
                        }
                    }
                }
            }
        }
        self.sync_ticker();
        failure.map_or(Ok(changed), Err)
    }

    fn finish_solve(&mut self, outcome: SolveOutcome) -> bool {
        match outcome {
            SolveOutcome::Solved(solution) => {
                let moves = solution.moves().to_string();
                self.update(move |state| {
                    if state.mode != Mode::Solving {
                        return state.clone();
                    }
                    SessionState {
                        mode: Mode::Solved,
                        playback_board: state.board.clone(),
                        solution: Some(moves),
                        playback: PlaybackStatus::Playing,
                        playback_position: 0,
                        ..state.clone()
                    }
                })
            }
            SolveOutcome::NoSolution => self.update(return_to_edit),
            SolveOutcome::Cancelled => false,
        }
    }

    fn join_solve_worker(&mut self) {
        if let Some(worker) = self.solve.take()
            && worker.handle.join().is_err()
        {
            log::error!("Solve thread panicked");
        }
    }

    /// Keep the ticker running exactly while a solution is playing.
    fn sync_ticker(&mut self) {
        let playing = self.state.mode == Mode::Solved && self.state.playback == PlaybackStatus::Playing;
        if playing && self.ticker.is_none() {
            let sender = self.sender.clone();
            let started = PlaybackScheduler::start(TICK_PERIOD, move || {
                sender.send(Message::Update(Box::new(playback::tick))).is_ok()
            });
            match started {
                Ok(ticker) => self.ticker = Some(ticker),
                Err(error) => log::error!("Failed to start playback ticker: {error}"),
            }
        } else if !playing && self.ticker.is_some() {
            debug_log!("Stopping playback ticker");
            self.ticker = None;
        }
    }

    pub fn set_tool(&mut self, tool: EditTool) {
        self.update(|state| SessionState {
            active_tool: tool,
            ..state.clone()
        });
    }

    /// Paint with the active tool. Ignored outside edit mode.
    pub fn draw(&mut self, x: i32, y: i32) {
        self.update(|state| {
            if state.mode != Mode::Edit {
                return state.clone();
            }
            let mut board = state.board.clone();
            board.draw(x, y, state.active_tool);
            SessionState {
                board,
                ..state.clone()
            }
        });
    }

    /// Replace the edited board with a level parsed from `text`.
    pub fn paste_level(&mut self, text: &str) {
        let board = Board::from_xsb(text);
        self.update(|state| {
            if state.mode != Mode::Edit {
                return state.clone();
            }
            SessionState {
                playback_board: board.clone(),
                board,
                playback_position: 0,
                ..state.clone()
            }
        });
    }

    pub fn set_timeout(&mut self, seconds: u32) {
        self.update(|state| {
            if state.mode == Mode::Solving {
                return state.clone();
            }
            SessionState {
                solver_timeout: seconds,
                ..state.clone()
            }
        });
    }

    /// Start solving the edited board on a background thread.
    ///
    /// Returns `Ok(false)` when not in edit mode or while a previous solve
    /// has not yet reported back.
    pub fn solve(&mut self) -> Result<bool, SolveError> {
        if self.state.mode != Mode::Edit {
            return Ok(false);
        }
        if self.solve.is_some() {
            log::warn!("Solve requested while the previous engine is still shutting down");
            return Ok(false);
        }

        let board = self.state.board.clone();
        let time_limit = self.state.solver_timeout;
        let orchestrator = self.orchestrator.clone();
        let token = CancelToken::new();
        let worker_token = token.clone();
        let sender = self.sender.clone();

        let handle = thread::Builder::new()
            .name("festival-solve".to_string())
            .spawn(move || {
                let progress = sender.clone();
                let result = orchestrator.solve(&board, time_limit, &worker_token, |latest| {
                    let _ = progress.send(Message::Update(Box::new(move |state: &SessionState| {
                        show_progress(state, latest)
                    })));
                });
                let _ = sender.send(Message::SolveFinished(result));
            })?;

        info_log!("Solve started with a {}s budget", time_limit);
        self.solve = Some(SolveWorker { token, handle });
        self.update(|state| SessionState {
            mode: Mode::Solving,
            playback_board: state.board.clone(),
            solution: None,
            playback: PlaybackStatus::Stopped,
            playback_position: 0,
            ..state.clone()
        });
        self.sync_ticker();
        Ok(true)
    }

    /// Kill a running engine and go back to edit mode.
    pub fn cancel(&mut self) {
        if let Some(worker) = &self.solve {
            worker.token.cancel();
        }
        self.update(return_to_edit);
        self.sync_ticker();
    }

    pub fn play(&mut self) {
        self.update_playback(playback::play);
    }

    pub fn pause(&mut self) {
        self.update_playback(playback::pause);
    }

    pub fn stop(&mut self) {
        self.update_playback(playback::stop);
    }

    fn update_playback(&mut self, transition: fn(&SessionState) -> SessionState) {
        self.update(|state| {
            if state.mode == Mode::Solved {
                transition(state)
            } else {
                state.clone()
            }
        });
        self.sync_ticker();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.ticker = None;
        if let Some(worker) = self.solve.take() {
            worker.token.cancel();
            if worker.handle.join().is_err() {
                log::error!("Solve thread panicked");
            }
        }
    }
}

fn show_progress(state: &SessionState, board: Board) -> SessionState {
    if state.mode != Mode::Solving {
        return state.clone();
    }
    SessionState {
        playback_board: board,
        ..state.clone()
    }
}

fn return_to_edit(state: &SessionState) -> SessionState {
    if state.mode == Mode::Edit {
        return state.clone();
    }
    SessionState {
        mode: Mode::Edit,
        playback_board: state.board.clone(),
        playback: PlaybackStatus::Stopped,
        playback_position: 0,
        ..state.clone()
    }
}
