//! Sokoban board model.
//!
//! A [`Board`] is a rectangular grid of XSB characters. Tiles are kept as the
//! characters they were read from, so the alternative floor glyphs `-` and `_`
//! survive a load/save cycle even though they play exactly like a space.
//!
//! # Editing
//! [`Board::draw`] paints one tile with an [`EditTool`] and grows the board
//! towards cells outside the current bounds, up to [`MAX_BOARD_SIZE`] in each
//! dimension.
//!
//! # Moves
//! [`Board::move_player`] validates the whole step before writing anything, so
//! a rejected move leaves the board untouched.

use crate::debug_log;
use regex_lite::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Largest width or height an edit may grow the board to.
pub const MAX_BOARD_SIZE: usize = 51;
const EMPTY_BOARD_SIZE: usize = 6;

pub const WALL: char = '#';
pub const SPACE: char = ' ';
pub const SPACE_ALT1: char = '-';
pub const SPACE_ALT2: char = '_';
pub const BOX: char = '$';
pub const PLAYER: char = '@';
pub const TARGET: char = '.';
pub const BOX_ON_TARGET: char = '*';
pub const PLAYER_ON_TARGET: char = '+';

// Outer floor runs are ignored; what remains must start and end with a wall
// or a box on target.
static BOARD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-_ ]*[#*]([-# _.$*@+]*[#*])?[-_ ]*$").expect("board line pattern is valid")
});

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tile {
    Wall,
    Space,
    Box,
    Player,
    Target,
    BoxOnTarget,
    PlayerOnTarget,
}

impl Tile {
    /// Parse an XSB character. All three floor glyphs map to [`Tile::Space`].
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            WALL => Some(Self::Wall),
            SPACE | SPACE_ALT1 | SPACE_ALT2 => Some(Self::Space),
            BOX => Some(Self::Box),
            PLAYER => Some(Self::Player),
            TARGET => Some(Self::Target),
            BOX_ON_TARGET => Some(Self::BoxOnTarget),
            PLAYER_ON_TARGET => Some(Self::PlayerOnTarget),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Self::Wall => WALL,
            Self::Space => SPACE,
            Self::Box => BOX,
            Self::Player => PLAYER,
            Self::Target => TARGET,
            Self::BoxOnTarget => BOX_ON_TARGET,
            Self::PlayerOnTarget => PLAYER_ON_TARGET,
        }
    }

    #[must_use]
    pub fn is_player(self) -> bool {
        matches!(self, Self::Player | Self::PlayerOnTarget)
    }

    #[must_use]
    pub fn is_box(self) -> bool {
        matches!(self, Self::Box | Self::BoxOnTarget)
    }

    #[must_use]
    pub fn is_on_target(self) -> bool {
        matches!(self, Self::Target | Self::BoxOnTarget | Self::PlayerOnTarget)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Parse a LURD move letter. Case only records whether the move pushed,
    /// so both cases are accepted.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'u' => Some(Self::Up),
            'd' => Some(Self::Down),
            'l' => Some(Self::Left),
            'r' => Some(Self::Right),
            _ => None,
        }
    }

    fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

/// Painting tool used in edit mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum EditTool {
    #[default]
    Wall,
    Box,
    Target,
    Player,
    Space,
}

impl EditTool {
    pub const ALL: [Self; 5] = [Self::Wall, Self::Box, Self::Target, Self::Player, Self::Space];

    /// Tools are selected by the XSB character they paint.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            WALL => Some(Self::Wall),
            BOX => Some(Self::Box),
            TARGET => Some(Self::Target),
            PLAYER => Some(Self::Player),
            SPACE => Some(Self::Space),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Self::Wall => WALL,
            Self::Box => BOX,
            Self::Target => TARGET,
            Self::Player => PLAYER,
            Self::Space => SPACE,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Wall => "Wall",
            Self::Box => "Box",
            Self::Target => "Target",
            Self::Player => "Player",
            Self::Space => "Space",
        }
    }
}

/// Returns true if `line` is part of a level rather than surrounding text.
#[must_use]
pub fn is_board_line(line: &str) -> bool {
    BOARD_LINE.is_match(line)
}

/// Rectangular Sokoban grid. `Clone` produces fully independent storage.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Board {
    rows: Vec<Vec<char>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    /// The canonical blank 6x6 board.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rows: vec![vec![SPACE; EMPTY_BOARD_SIZE]; EMPTY_BOARD_SIZE],
        }
    }

    /// Parse a level from XSB text.
    ///
    /// Leading and trailing lines that are not board lines are dropped and the
    /// remaining lines are padded with spaces to a common width. Text without
    /// any board line yields [`Board::empty`].
    #[must_use]
    pub fn from_xsb(level: &str) -> Self {
        let lines: Vec<String> = level
            .split('\n')
            .map(|line| line.replace('\r', ""))
            .collect();

        let Some(first) = lines.iter().position(|line| is_board_line(line)) else {
            return Self::empty();
        };
        let last = lines
            .iter()
            .rposition(|line| is_board_line(line))
            .unwrap_or(first);
        let kept = &lines[first..=last];

        let width = kept
            .iter()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        if width == 0 {
            return Self::empty();
        }

        let rows = kept
            .iter()
            .map(|line| {
                let mut row: Vec<char> = line.chars().collect();
                row.resize(width, SPACE);
                row
            })
            .collect();
        Self { rows }
    }

    #[must_use]
    pub fn to_xsb(&self) -> String {
        let mut output = String::with_capacity(self.height() * (self.width() + 1));
        for row in &self.rows {
            output.extend(row.iter());
            output.push('\n');
        }
        output
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[char]> {
        self.rows.iter().map(Vec::as_slice)
    }

    #[must_use]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }

    /// Raw character at `(x, y)`, preserving alternative floor glyphs.
    #[must_use]
    pub fn get_xy(&self, x: i32, y: i32) -> Option<char> {
        if self.in_bounds(x, y) {
            Some(self.rows[y as usize][x as usize])
        } else {
            None
        }
    }

    /// Tile at `(x, y)`; `None` when out of bounds or not an XSB tile.
    #[must_use]
    pub fn tile_at(&self, x: i32, y: i32) -> Option<Tile> {
        self.get_xy(x, y).and_then(Tile::from_char)
    }

    fn set(&mut self, x: i32, y: i32, tile: Tile) {
        self.rows[y as usize][x as usize] = tile.to_char();
    }

    /// Position of the player; the last one in row-major order if several.
    #[must_use]
    pub fn player_position(&self) -> Option<(i32, i32)> {
        let mut found = None;
        for (y, row) in self.rows.iter().enumerate() {
            for (x, &c) in row.iter().enumerate() {
                if c == PLAYER || c == PLAYER_ON_TARGET {
                    found = Some((x as i32, y as i32));
                }
            }
        }
        found
    }

    #[must_use]
    pub fn count_tiles(&self, predicate: impl Fn(Tile) -> bool) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter_map(|&c| Tile::from_char(c))
            .filter(|&tile| predicate(tile))
            .count()
    }

    /// Perform a single player move given as a LURD letter.
    ///
    /// Returns false, without touching the board, if there is no player, the
    /// letter is not a direction, or the move is blocked.
    pub fn move_player(&mut self, direction: char) -> bool {
        let Some(direction) = Direction::from_char(direction) else {
            return false;
        };
        let Some((px, py)) = self.player_position() else {
            return false;
        };
        let (dx, dy) = direction.delta();
        let (nx, ny) = (px + dx, py + dy);
        let (bx, by) = (px + 2 * dx, py + 2 * dy);

        let Some(next) = self.tile_at(nx, ny) else {
            return false;
        };
        let pushed = match next {
            Tile::Box | Tile::BoxOnTarget => match self.tile_at(bx, by) {
                Some(Tile::Space) => Some(Tile::Box),
                Some(Tile::Target) => Some(Tile::BoxOnTarget),
                _ => return false,
            },
            Tile::Space | Tile::Target => None,
            Tile::Wall | Tile::Player | Tile::PlayerOnTarget => return false,
        };

        if let Some(tile) = pushed {
            self.set(bx, by, tile);
        }
        let entered = if next.is_on_target() {
            Tile::PlayerOnTarget
        } else {
            Tile::Player
        };
        self.set(nx, ny, entered);
        let vacated = if self.tile_at(px, py) == Some(Tile::PlayerOnTarget) {
            Tile::Target
        } else {
            Tile::Space
        };
        self.set(px, py, vacated);
        true
    }

    /// Apply a LURD move string. Stops at the first invalid move; moves
    /// before it stay applied.
    pub fn move_sequence(&mut self, lurd: &str) -> bool {
        lurd.chars().all(|c| self.move_player(c))
    }

    fn remove_player(&mut self) {
        for c in self.rows.iter_mut().flatten() {
            if *c == PLAYER {
                *c = SPACE;
            } else if *c == PLAYER_ON_TARGET {
                *c = TARGET;
            }
        }
    }

    /// Paint the tile at `(x, y)` with `tool`.
    ///
    /// Coordinates outside the board grow it with floor rows and columns on
    /// the needed side. If that would make a dimension exceed
    /// [`MAX_BOARD_SIZE`] nothing changes.
    pub fn draw(&mut self, x: i32, y: i32, tool: EditTool) {
        // Widened so coordinates near i32::MIN/MAX cannot overflow.
        let (width, height) = (self.width() as i64, self.height() as i64);
        let (wx, wy) = (i64::from(x), i64::from(y));
        let grow_left = (-wx).max(0);
        let grow_right = (wx - width + 1).max(0);
        let grow_top = (-wy).max(0);
        let grow_bottom = (wy - height + 1).max(0);

        let limit = MAX_BOARD_SIZE as i64;
        let horizontal = grow_left + grow_right;
        let vertical = grow_top + grow_bottom;
        if (horizontal > 0 && width + horizontal > limit)
            || (vertical > 0 && height + vertical > limit)
        {
            debug_log!("draw({}, {}) ignored: board would exceed {}", x, y, MAX_BOARD_SIZE);
            return;
        }
        let (grow_left, grow_right) = (grow_left as usize, grow_right as usize);
        let (grow_top, grow_bottom) = (grow_top as usize, grow_bottom as usize);

        if horizontal > 0 {
            for row in &mut self.rows {
                let mut grown = vec![SPACE; grow_left];
                grown.append(row);
                grown.resize(grown.len() + grow_right, SPACE);
                *row = grown;
            }
        }
        if vertical > 0 {
            let new_width = self.width();
            let mut grown = vec![vec![SPACE; new_width]; grow_top];
            grown.append(&mut self.rows);
            grown.resize(grown.len() + grow_bottom, vec![SPACE; new_width]);
            self.rows = grown;
        }

        let (x, y) = (x + grow_left as i32, y + grow_top as i32);
        let current = self.tile_at(x, y);
        let painted = match tool {
            EditTool::Wall => Tile::Wall,
            EditTool::Box => match current {
                Some(Tile::Target | Tile::PlayerOnTarget | Tile::Box) => Tile::BoxOnTarget,
                _ => Tile::Box,
            },
            EditTool::Player => {
                self.remove_player();
                match current {
                    Some(Tile::Target | Tile::BoxOnTarget | Tile::Player) => Tile::PlayerOnTarget,
                    _ => Tile::Player,
                }
            }
            // A target painted over a target becomes a packed box.
            EditTool::Target => match current {
                Some(Tile::Box | Tile::Target) => Tile::BoxOnTarget,
                Some(Tile::Player) => Tile::PlayerOnTarget,
                _ => Tile::Target,
            },
            EditTool::Space => Tile::Space,
        };
        self.set(x, y, painted);
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xsb())
    }
}
