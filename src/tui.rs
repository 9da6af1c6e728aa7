//! TUI (Terminal User Interface) level editor.
//!
//! Renders session snapshots with Ratatui and turns key presses into session
//! commands.
//!
//! # Architecture
//! - `Editor`: terminal-free controller holding the session, the latest
//!   snapshot and the edit cursor
//! - `TuiApp`: owns the terminal and runs the event loop around an `Editor`
//!
//! # Modes
//! The instructions line follows the session mode:
//! `Edit` → `s` → `Solving` → (solution) → `Solved` → `Esc` → back to `Edit`

use crate::board::{self, Board, EditTool, Tile};
use crate::playback::PlaybackStatus;
use crate::session::{Mode, Session, SessionState};
use crate::{debug_log, info_log};
use crossbeam_channel::Receiver;
use crossterm::{
    cursor,
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::io;
use std::sync::Arc;
use std::time::Duration;

const EVENT_POLL_TIMEOUT_MS: u64 = 50;
const TIMEOUT_STEP_SECS: u32 = 10;
const MIN_TIMEOUT_SECS: u32 = 1;

// Style constants for consistent UI
const HEADER_STYLE: Style = Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD);
const ERROR_STYLE: Style = Style::new().fg(Color::Red);
const SUCCESS_STYLE: Style = Style::new().fg(Color::Green).add_modifier(Modifier::BOLD);
const INFO_STYLE: Style = Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD);
const MESSAGE_STYLE: Style = Style::new().fg(Color::Cyan);
const CURSOR_STYLE: Style = Style::new().bg(Color::Yellow).fg(Color::Black);

fn tile_style(tile: Tile) -> Style {
    match tile {
        Tile::Wall => Style::new().bg(Color::Cyan),
        Tile::Space => Style::new().bg(Color::White),
        Tile::Target => Style::new().bg(Color::Red),
        Tile::Box => Style::new().fg(Color::DarkGray).bg(Color::White),
        Tile::BoxOnTarget => Style::new().fg(Color::DarkGray).bg(Color::Red),
        Tile::Player => Style::new().fg(Color::Blue).bg(Color::White),
        Tile::PlayerOnTarget => Style::new().fg(Color::Blue).bg(Color::Red),
    }
}

fn tile_glyph(tile: Tile) -> &'static str {
    match tile {
        Tile::Wall | Tile::Space | Tile::Target => "  ",
        Tile::Box | Tile::BoxOnTarget => "[]",
        Tile::Player | Tile::PlayerOnTarget => "@@",
    }
}

/// Context for rendering the UI - groups related parameters to avoid too many function arguments.
struct RenderContext<'a> {
    state: &'a SessionState,
    cursor: (i32, i32),
    message: &'a str,
    error_message: &'a str,
}

/// Terminal-free editor state and key handling.
struct Editor {
    session: Session,
    updates: Receiver<Arc<SessionState>>,
    snapshot: Arc<SessionState>,
    cursor: (i32, i32),
    message: String,
    error_message: String,
    exported: Option<String>,
    quit: bool,
}

impl Editor {
    fn new(mut session: Session) -> Self {
        let updates = session.subscribe();
        let snapshot = session.state();
        Self {
            session,
            updates,
            snapshot,
            cursor: (0, 0),
            message: String::new(),
            error_message: String::new(),
            exported: None,
            quit: false,
        }
    }

    /// Apply queued background work and take the newest snapshot.
    fn pump(&mut self, timeout: Duration) {
        if let Err(error) = self.session.pump(timeout) {
            self.error_message = format!("Solver failed: {error}");
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        for snapshot in self.updates.try_iter() {
            match (self.snapshot.mode, snapshot.mode) {
                (Mode::Solving, Mode::Solved) => {
                    self.message = format!(
                        "Solved: {} moves, {} pushes",
                        snapshot.count_solution_moves(),
                        snapshot.count_solution_pushes()
                    );
                }
                (Mode::Solving, Mode::Edit) if self.error_message.is_empty() && self.message.is_empty() => {
                    self.message = "No solution found".to_string();
                }
                _ => {}
            }
            self.snapshot = snapshot;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(event::KeyModifiers::CONTROL) {
            if key.code == KeyCode::Char('c') {
                self.quit = true;
            }
            return;
        }
        debug_log!("handle_key() - {:?} in {:?}", key.code, self.snapshot.mode);

        match key.code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Char('c') => self.export(),
            KeyCode::Char('[') => self.change_timeout(false),
            KeyCode::Char(']') => self.change_timeout(true),
            KeyCode::Esc => self.leave_mode(),
            _ => match self.snapshot.mode {
                Mode::Edit => self.handle_edit_key(key),
                Mode::Solving => {}
                Mode::Solved => self.handle_solved_key(key),
            },
        }
        self.refresh();
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Left => self.move_cursor(-1, 0),
            KeyCode::Right => self.move_cursor(1, 0),
            KeyCode::Up => self.move_cursor(0, -1),
            KeyCode::Down => self.move_cursor(0, 1),
            KeyCode::Enter => self.paint(),
            KeyCode::Char('s') => self.start_solve(),
            KeyCode::Char(c) => {
                if let Some(tool) = EditTool::from_char(c) {
                    self.session.set_tool(tool);
                }
            }
            _ => {}
        }
    }

    fn handle_solved_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('p') => {
                if self.snapshot.playback == PlaybackStatus::Playing {
                    self.session.pause();
                } else {
                    self.session.play();
                }
            }
            KeyCode::Char('o') => self.session.stop(),
            _ => {}
        }
    }

    /// Cursor may sit one cell outside the board so painting there grows it.
    fn move_cursor(&mut self, dx: i32, dy: i32) {
        let board = &self.snapshot.board;
        let (width, height) = (board.width() as i32, board.height() as i32);
        self.cursor = (
            (self.cursor.0 + dx).clamp(-1, width),
            (self.cursor.1 + dy).clamp(-1, height),
        );
    }

    fn paint(&mut self) {
        let (x, y) = self.cursor;
        self.session.draw(x, y);
        // Growing to the left or top shifts the painted cell to index 0.
        self.cursor = (x.max(0), y.max(0));
    }

    fn paste(&mut self, text: &str) {
        if self.snapshot.mode != Mode::Edit {
            return;
        }
        self.session.paste_level(text);
        self.cursor = (0, 0);
        self.message = "Level pasted".to_string();
        self.refresh();
    }

    fn start_solve(&mut self) {
        self.message.clear();
        self.error_message.clear();
        match self.session.solve() {
            Ok(true) => {}
            Ok(false) => self.error_message = "The previous solver is still stopping".to_string(),
            Err(error) => self.error_message = format!("Could not start solver: {error}"),
        }
    }

    fn leave_mode(&mut self) {
        if self.snapshot.mode != Mode::Edit {
            info_log!("Returning to edit mode from {:?}", self.snapshot.mode);
            self.session.cancel();
            self.message = "Back to editing".to_string();
        }
    }

    fn change_timeout(&mut self, up: bool) {
        let current = self.snapshot.solver_timeout;
        let next = if up {
            current.saturating_add(TIMEOUT_STEP_SECS)
        } else {
            current.saturating_sub(TIMEOUT_STEP_SECS).max(MIN_TIMEOUT_SECS)
        };
        self.session.set_timeout(next);
    }

    /// Keep the level and solution so they can be printed after the terminal
    /// is restored.
    fn export(&mut self) {
        let mut text = self.snapshot.board.to_xsb();
        if let Some(solution) = &self.snapshot.solution {
            text.push_str(solution);
            text.push('\n');
        }
        log::info!("Exported level:\n{text}");
        self.exported = Some(text);
        self.message = "Level copied; it is printed on exit".to_string();
    }

    fn status(&self) -> String {
        let state = &self.snapshot;
        match state.mode {
            Mode::Edit => format!(
                "Editing | tool: {} | cursor: {},{} | time budget: {}s",
                state.active_tool.name(),
                self.cursor.0,
                self.cursor.1,
                state.solver_timeout
            ),
            Mode::Solving => format!("Solving... (budget {}s)", state.solver_timeout),
            Mode::Solved => format!(
                "Solution {:?} | move {}/{}",
                state.playback,
                state.playback_position,
                state.count_solution_moves()
            ),
        }
    }
}

/// Main TUI application.
///
/// Owns the terminal for its lifetime; dropping it restores the screen.
pub struct TuiApp {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    editor: Editor,
}

impl TuiApp {
    pub fn new(session: Session) -> Result<Self, io::Error> {
        info_log!("TuiApp::new() - Initializing TUI");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableBracketedPaste, cursor::Hide)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        info_log!("Terminal setup complete");

        Ok(Self {
            terminal,
            editor: Editor::new(session),
        })
    }

    pub fn cleanup(&mut self) -> Result<(), io::Error> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            DisableBracketedPaste,
            LeaveAlternateScreen,
            cursor::Show
        )?;
        Ok(())
    }

    /// Run until the user quits. Returns the last exported level, if any.
    pub fn run(mut self) -> Result<Option<String>, io::Error> {
        while !self.editor.quit {
            self.draw()?;
            if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
                self.handle_event(event::read()?);
            }
            self.editor.pump(Duration::ZERO);
        }
        info_log!("Editor closed");
        Ok(self.editor.exported.take())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => self.editor.handle_key(key),
            Event::Paste(text) => self.editor.paste(&text),
            other => {
                debug_log!("handle_event() - Ignoring {:?}", other);
            }
        }
    }

    fn draw(&mut self) -> Result<(), io::Error> {
        let status = self.editor.status();
        let ctx = RenderContext {
            state: &self.editor.snapshot,
            cursor: self.editor.cursor,
            message: &self.editor.message,
            error_message: &self.editor.error_message,
        };
        self.terminal.draw(|f| {
            Self::render_static(f, &ctx, &status);
        })?;
        Ok(())
    }

    /// Render the complete UI layout using the provided context.
    fn render_static(f: &mut Frame, ctx: &RenderContext, status: &str) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Min(8),    // Board and info side by side
                Constraint::Length(3), // Status line
                Constraint::Length(3), // Instructions
            ])
            .split(f.area());
        let middle = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20), Constraint::Length(36)])
            .split(chunks[1]);

        Self::render_title(f, chunks[0]);
        Self::render_board(f, middle[0], ctx);
        Self::render_info(f, middle[1], ctx);
        Self::render_status(f, chunks[2], status);
        Self::render_instructions(f, chunks[3], ctx.state.mode);
    }

    fn render_title(f: &mut Frame, area: Rect) {
        let title = Paragraph::new("SOKOBAN FESTIVAL")
            .style(HEADER_STYLE)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, area);
    }

    fn render_board(f: &mut Frame, area: Rect, ctx: &RenderContext) {
        let board = ctx.state.display_board();
        let title = match ctx.state.mode {
            Mode::Edit => "Level",
            Mode::Solving => "Engine progress",
            Mode::Solved => "Playback",
        };
        let show_cursor = ctx.state.mode == Mode::Edit;
        let lines: Vec<Line> = (-1..=board.height() as i32)
            .map(|y| Self::board_line(board, y, show_cursor.then_some(ctx.cursor)))
            .collect();

        let paragraph =
            Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(paragraph, area);
    }

    /// One screen row, including the margin cells the cursor can reach.
    fn board_line(board: &Board, y: i32, cursor: Option<(i32, i32)>) -> Line<'static> {
        let spans: Vec<Span> = (-1..=board.width() as i32)
            .map(|x| {
                let tile = board.tile_at(x, y);
                let (text, style) = match tile {
                    Some(tile) => (tile_glyph(tile), tile_style(tile)),
                    None => ("  ", Style::default()),
                };
                if cursor == Some((x, y)) {
                    let text = if tile.is_some() { text } else { "<>" };
                    Span::styled(text, CURSOR_STYLE)
                } else {
                    Span::styled(text, style)
                }
            })
            .collect();
        Line::from(spans)
    }

    fn render_info(f: &mut Frame, area: Rect, ctx: &RenderContext) {
        let state = ctx.state;
        let mut lines = Vec::new();

        lines.push(Line::from(vec![Span::styled("Tools:", HEADER_STYLE)]));
        for tool in EditTool::ALL {
            let marker = if tool == state.active_tool { ">" } else { " " };
            lines.push(Line::from(format!(
                " {marker} '{}' {}",
                tool.to_char(),
                tool.name()
            )));
        }
        lines.push(Line::from(""));

        let board = state.display_board();
        lines.push(Line::from(vec![Span::styled(
            format!(
                "Size {}x{} (max {})",
                board.width(),
                board.height(),
                board::MAX_BOARD_SIZE
            ),
            INFO_STYLE,
        )]));
        lines.push(Line::from(format!(
            "Boxes: {}  On target: {}",
            board.count_tiles(Tile::is_box),
            board.count_tiles(|tile| tile == Tile::BoxOnTarget)
        )));

        if let Some(solution) = &state.solution {
            lines.push(Line::from(""));
            lines.push(Line::from(vec![Span::styled(
                format!(
                    "Solution: {} moves, {} pushes",
                    state.count_solution_moves(),
                    state.count_solution_pushes()
                ),
                SUCCESS_STYLE,
            )]));
            lines.push(Line::from(solution.clone()));
        }

        if !ctx.message.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(vec![Span::styled(ctx.message, MESSAGE_STYLE)]));
        }
        if !ctx.error_message.is_empty() {
            lines.push(Line::from(vec![Span::styled(ctx.error_message, ERROR_STYLE)]));
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Information").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_instructions(f: &mut Frame, area: Rect, mode: Mode) {
        let text = match mode {
            Mode::Edit => {
                "Arrows: Move | # $ . @ SPACE: Tool | ENTER: Paint | s: Solve | [ ]: Time | c: Copy | q: Quit"
            }
            Mode::Solving => "ESC: Cancel | q: Quit",
            Mode::Solved => "p: Play/Pause | o: Stop | ESC: Edit | c: Copy | q: Quit",
        };

        let paragraph = Paragraph::new(text)
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(paragraph, area);
    }

    fn render_status(f: &mut Frame, area: Rect, status: &str) {
        let paragraph = Paragraph::new(status.to_string())
            .style(HEADER_STYLE)
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(paragraph, area);
    }
}

impl Drop for TuiApp {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveOrchestrator;
    use crossterm::event::KeyModifiers;
    use std::time::Instant;

    const LEVEL: &str = "#####\n#@$.#\n#####\n";

    fn editor() -> Editor {
        Editor::new(Session::new(
            SolveOrchestrator::new("festival-not-installed"),
            SessionState::with_board(Board::from_xsb(LEVEL)),
        ))
    }

    fn press(editor: &mut Editor, code: KeyCode) {
        editor.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_cursor_stays_within_margin() {
        let mut editor = editor();
        for _ in 0..3 {
            press(&mut editor, KeyCode::Left);
            press(&mut editor, KeyCode::Up);
        }
        assert_eq!(editor.cursor, (-1, -1));

        for _ in 0..10 {
            press(&mut editor, KeyCode::Right);
            press(&mut editor, KeyCode::Down);
        }
        assert_eq!(editor.cursor, (5, 3));
    }

    #[test]
    fn test_tool_keys_and_painting() {
        let mut editor = editor();
        press(&mut editor, KeyCode::Char('.'));
        assert_eq!(editor.snapshot.active_tool, EditTool::Target);

        press(&mut editor, KeyCode::Right);
        press(&mut editor, KeyCode::Down);
        press(&mut editor, KeyCode::Enter);
        assert_eq!(editor.snapshot.board.get_xy(1, 1), Some('+'));

        press(&mut editor, KeyCode::Char(' '));
        assert_eq!(editor.snapshot.active_tool, EditTool::Space);
    }

    #[test]
    fn test_painting_in_margin_grows_board() {
        let mut editor = editor();
        press(&mut editor, KeyCode::Left);
        press(&mut editor, KeyCode::Enter);

        let board = &editor.snapshot.board;
        assert_eq!(board.width(), 6);
        assert_eq!(board.get_xy(0, 0), Some('#'));
        assert_eq!(editor.cursor, (0, 0));
    }

    #[test]
    fn test_timeout_keys() {
        let mut editor = editor();
        press(&mut editor, KeyCode::Char(']'));
        assert_eq!(editor.snapshot.solver_timeout, 610);
        for _ in 0..100 {
            press(&mut editor, KeyCode::Char('['));
        }
        assert_eq!(editor.snapshot.solver_timeout, 1);
    }

    #[test]
    fn test_paste_and_export() {
        let mut editor = editor();
        editor.paste("; pasted\n######\n#@ $.#\n######\n");
        assert_eq!(editor.snapshot.board.to_xsb(), "######\n#@ $.#\n######\n");

        press(&mut editor, KeyCode::Char('c'));
        assert_eq!(editor.exported.as_deref(), Some("######\n#@ $.#\n######\n"));
    }

    #[test]
    fn test_quit_keys() {
        let mut editor = editor();
        press(&mut editor, KeyCode::Char('x'));
        assert!(!editor.quit);
        press(&mut editor, KeyCode::Char('q'));
        assert!(editor.quit);

        let mut editor = self::editor();
        editor.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(editor.quit);
        assert!(editor.exported.is_none());
    }

    #[test]
    fn test_failed_solve_reports_error() {
        let mut editor = editor();
        press(&mut editor, KeyCode::Char('s'));
        assert_eq!(editor.snapshot.mode, Mode::Solving);

        let deadline = Instant::now() + Duration::from_secs(10);
        while editor.error_message.is_empty() && Instant::now() < deadline {
            editor.pump(Duration::from_millis(20));
        }
        assert!(editor.error_message.starts_with("Solver failed"));
        assert_eq!(editor.snapshot.mode, Mode::Edit);
    }

    #[test]
    fn test_board_line_marks_cursor_in_margin() {
        let board = Board::from_xsb(LEVEL);
        let line = TuiApp::board_line(&board, 1, Some((-1, 1)));
        assert_eq!(line.spans.len(), board.width() + 2);
        assert_eq!(line.spans[0].content, "<>");
        assert_eq!(line.spans[2].content, tile_glyph(Tile::Player));
    }
}
