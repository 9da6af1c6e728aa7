use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while turning engine output into boards.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error while reading engine output: {0}")]
    Io(#[from] io::Error),

    /// A cell whose colour pair and glyph match none of the known palettes.
    #[error("unknown tile in engine output: fg={fg} bg={bg} glyph={glyph:?}")]
    UnknownTile { fg: u16, bg: u16, glyph: char },
}

impl DecodeError {
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Fatal failure of a solve run. Expected outcomes (no solution, cancelled)
/// are not errors, see `SolveOutcome`.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to start engine {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("engine output could not be decoded: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tile_message_names_the_triple() {
        let error = DecodeError::UnknownTile {
            fg: 33,
            bg: 43,
            glyph: 'x',
        };
        assert_eq!(
            error.to_string(),
            "unknown tile in engine output: fg=33 bg=43 glyph='x'"
        );
        assert!(!error.is_io());
    }

    #[test]
    fn test_decode_error_wraps_into_solve_error() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let decode = DecodeError::from(io_error);
        assert!(decode.is_io());

        let solve = SolveError::from(decode);
        assert!(matches!(solve, SolveError::Decode(DecodeError::Io(_))));
    }
}
