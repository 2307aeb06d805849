//! Sweeper core
//!
//! The board model for a single-player minesweeper game: mine placement,
//! adjacency counts, flag toggling, the flood-fill reveal and win detection.
//! It knows nothing about windows, sockets or pixels; a presentation adapter
//! translates player input into [`Coord`]s and calls into [`Board`].
//!
//! ```rust
//! use sweeper_core::{Board, Coord, Reveal};
//!
//! let mut board = Board::from_mines(5, 5, &[Coord::new(0, 0)])?;
//!
//! match board.reveal(Coord::new(4, 4))? {
//!     Reveal::Opened(tiles) => assert_eq!(24, tiles.len()),
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! board.toggle_flag(Coord::new(0, 0))?;
//! assert!(board.check_win());
//! # Ok::<(), sweeper_core::BoardError>(())
//! ```
//!
//! The `models` and `protocol` modules hold the serde types exchanged with
//! adapters that talk to a remote front end.

pub mod board;
pub mod error;
pub mod models;
pub mod protocol;

pub use board::{Board, Coord, Reveal, Solution, WinRule, row_label};
pub use error::{BoardError, Result};
