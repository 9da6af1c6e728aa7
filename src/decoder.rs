//! Decoder for the engine's live progress output.
//!
//! The engine interleaves free-form log lines with progress frames. A frame
//! starts with a counter line (`"  <digits>"`) and continues over row lines
//! (`"<digit> <cells>"`), where every cell is an SGR colour group followed by
//! one glyph: `ESC[<fg>;<bg>m<glyph>`. The first line that is not a row ends
//! the frame and is then checked for a new header.
//!
//! [`BoardStream`] reads lazily, so each board is available as soon as its
//! frame ends rather than after the engine exits.

use crate::board::{self, Board};
use crate::debug_log;
use crate::error::DecodeError;
use regex_lite::Regex;
use std::io::BufRead;
use std::iter::FusedIterator;
use std::sync::LazyLock;

static FRAME_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^  \d+$").expect("frame header pattern is valid"));
static FRAME_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d .*$").expect("frame row pattern is valid"));
static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("\u{1b}\\[(\\d+);(\\d+)m(.)").expect("cell pattern is valid")
});

// Terminal foreground codes; the matching background code is 10 higher.
const CYAN: u16 = 36;
const RED: u16 = 31;
const BLUE: u16 = 34;
const MAGENTA: u16 = 35;
const DARK_GRAY: u16 = 90;
const LIGHT_BLUE: u16 = 94;
const WHITE: u16 = 97;
const BACKGROUND: u16 = 10;

const CYAN_BG: u16 = CYAN + BACKGROUND;
const RED_BG: u16 = RED + BACKGROUND;
const BLUE_BG: u16 = BLUE + BACKGROUND;
const MAGENTA_BG: u16 = MAGENTA + BACKGROUND;
const WHITE_BG: u16 = WHITE + BACKGROUND;

const BOX_GLYPH: char = '\u{25AE}';
const PLAYER_GLYPH: char = '.';

#[must_use]
pub fn is_frame_header(line: &str) -> bool {
    FRAME_HEADER.is_match(line)
}

#[must_use]
pub fn is_frame_row(line: &str) -> bool {
    FRAME_ROW.is_match(line)
}

/// Map one coloured cell to its XSB character.
///
/// Covers both engine palettes: blue/red paths and targets, and the
/// magenta/light-blue variant.
#[must_use]
pub fn decode_tile(fg: u16, bg: u16, glyph: char) -> Option<char> {
    let tile = match (fg, bg, glyph) {
        (WHITE, WHITE_BG, ' ') => board::SPACE,
        (CYAN, CYAN_BG, ' ') => board::WALL,
        (DARK_GRAY, WHITE_BG, BOX_GLYPH) => board::BOX,
        (RED, RED_BG, ' ') => board::TARGET,
        (BLUE, WHITE_BG, PLAYER_GLYPH) => board::PLAYER,
        (DARK_GRAY, RED_BG, BOX_GLYPH) => board::BOX_ON_TARGET,
        (BLUE, RED_BG, PLAYER_GLYPH) => board::PLAYER_ON_TARGET,
        (BLUE, BLUE_BG, ' ') => board::SPACE,
        (LIGHT_BLUE, BLUE_BG, PLAYER_GLYPH) => board::PLAYER,
        (DARK_GRAY, BLUE_BG, BOX_GLYPH) => board::BOX,
        (DARK_GRAY, MAGENTA_BG, BOX_GLYPH) => board::BOX_ON_TARGET,
        (DARK_GRAY, MAGENTA_BG, PLAYER_GLYPH) => board::TARGET,
        (LIGHT_BLUE, MAGENTA_BG, PLAYER_GLYPH) => board::PLAYER_ON_TARGET,
        _ => return None,
    };
    Some(tile)
}

fn decode_row(line: &str, xsb: &mut String) -> Result<(), DecodeError> {
    for cell in CELL.captures_iter(line) {
        let fg = cell[1].parse().unwrap_or(u16::MAX);
        let bg = cell[2].parse().unwrap_or(u16::MAX);
        let glyph = cell[3].chars().next().unwrap_or_default();
        let tile = decode_tile(fg, bg, glyph).ok_or(DecodeError::UnknownTile { fg, bg, glyph })?;
        xsb.push(tile);
    }
    xsb.push('\n');
    Ok(())
}

/// Lazy sequence of boards decoded from engine output.
///
/// Yields `Err` at most once: an I/O failure or an unknown cell ends the
/// stream. A frame still open at end of input is discarded.
pub struct BoardStream<R> {
    reader: R,
    buffer: Vec<u8>,
    frame: Option<String>,
    finished: bool,
}

impl<R: BufRead> BoardStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            frame: None,
            finished: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, DecodeError> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(None);
        }
        while matches!(self.buffer.last(), Some(b'\n' | b'\r')) {
            self.buffer.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }

    fn fail(&mut self, error: DecodeError) -> Option<Result<Board, DecodeError>> {
        self.finished = true;
        self.frame = None;
        Some(Err(error))
    }
}

impl<R: BufRead> Iterator for BoardStream<R> {
    type Item = Result<Board, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    if self.frame.take().is_some() {
                        debug_log!("Discarding unterminated frame at end of engine output");
                    }
                    self.finished = true;
                    return None;
                }
                Err(error) => return self.fail(error),
            };
            debug_log!("engine: {}", line);

            let completed = match self.frame.take() {
                Some(mut xsb) if is_frame_row(&line) => {
                    if let Err(error) = decode_row(&line, &mut xsb) {
                        return self.fail(error);
                    }
                    self.frame = Some(xsb);
                    None
                }
                Some(xsb) => Some(Board::from_xsb(&xsb)),
                None => None,
            };

            if is_frame_header(&line) {
                self.frame = Some(String::new());
            }
            if let Some(board) = completed {
                return Some(Ok(board));
            }
        }
    }
}

impl<R: BufRead> FusedIterator for BoardStream<R> {}
