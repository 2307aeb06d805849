use thiserror::Error;

use crate::board::Coord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Construction parameters that cannot describe a playable board
    #[error("invalid board configuration: {rows}x{columns} with {mines} mines")]
    InvalidConfiguration {
        rows: usize,
        columns: usize,
        mines: usize,
    },

    /// A coordinate outside `[0, rows) x [0, columns)`
    #[error("tile ({}, {}) is outside the {rows}x{columns} board", .coord.row, .coord.col)]
    OutOfBounds {
        coord: Coord,
        rows: usize,
        columns: usize,
    },
}

pub type Result<T> = std::result::Result<T, BoardError>;
