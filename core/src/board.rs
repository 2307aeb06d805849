use std::{collections::VecDeque, fmt, str::FromStr};

use rand::{Rng, seq::index};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{
    error::{BoardError, Result},
    models::Cell,
};

static DIRECTIONS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Which condition ends the game in a win.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WinRule {
    /// Every safe tile is open and every mine carries a flag.
    #[default]
    ClearAndFlag,
    /// Every safe tile is open; flags are irrelevant.
    ClearSafeTiles,
}

impl FromStr for WinRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear-and-flag" | "flag" => Ok(Self::ClearAndFlag),
            "clear" | "clear-safe-tiles" => Ok(Self::ClearSafeTiles),
            other => Err(format!("unknown win rule: {other}")),
        }
    }
}

/// Outcome of a single reveal request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reveal {
    /// The tile was already open or is flagged.
    Unchanged,
    /// The tile was a mine. Only that tile has been opened.
    Detonated(Coord),
    /// Newly opened tiles, the requested tile first.
    Opened(Vec<Coord>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Tile {
    mine: bool,
    adjacent: u8,
    open: bool,
    flagged: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    columns: usize,
    tiles: Vec<Tile>,
    mines: Vec<Coord>,
    opened: usize,
    flagged: usize,
    win_rule: WinRule,
}

fn tile_count(rows: usize, columns: usize, mines: usize) -> Result<usize> {
    let invalid = || BoardError::InvalidConfiguration {
        rows,
        columns,
        mines,
    };

    if rows == 0 || columns == 0 {
        return Err(invalid());
    }

    let tiles = rows.checked_mul(columns).ok_or_else(invalid)?;

    if mines == 0 || mines >= tiles {
        return Err(invalid());
    }

    Ok(tiles)
}

fn neighbours_of(rows: usize, columns: usize, coord: Coord) -> impl Iterator<Item = Coord> {
    DIRECTIONS.iter().filter_map(move |&(dr, dc)| {
        let row = coord.row.checked_add_signed(dr)?;
        let col = coord.col.checked_add_signed(dc)?;
        (row < rows && col < columns).then_some(Coord { row, col })
    })
}

/// Label used for a row in text renderings: `A`..`Z`, then `AA`..`ZZ`, and so on.
pub fn row_label(row: usize) -> String {
    let letter = char::from(b'A' + (row % 26) as u8);
    std::iter::repeat_n(letter, 1 + row / 26).collect()
}

impl Board {
    /// Creates a board with mines placed by the thread-local RNG.
    pub fn new(rows: usize, columns: usize, mines: usize) -> Result<Self> {
        Self::with_rng(rows, columns, mines, &mut rand::rng())
    }

    /// Creates a board with mines placed by `rng`.
    ///
    /// Every subset of `mines` tiles is equally likely. Mined tile indices are
    /// drawn without replacement, so placement never retries on a collision.
    #[instrument(level = "trace", skip(rng))]
    pub fn with_rng<R: Rng>(rows: usize, columns: usize, mines: usize, rng: &mut R) -> Result<Self> {
        let tiles = tile_count(rows, columns, mines)?;

        let mut layout = vec![false; tiles];
        for mined in index::sample(rng, tiles, mines).iter() {
            layout[mined] = true;
        }

        let board = Self::from_layout(rows, columns, layout);
        debug!(
            "Placed {} mines on a {}x{} board",
            board.mine_count(),
            rows,
            columns
        );
        Ok(board)
    }

    /// Creates a board with mines at exactly the given coordinates.
    pub fn from_mines(rows: usize, columns: usize, mines: &[Coord]) -> Result<Self> {
        let tiles = tile_count(rows, columns, mines.len())?;

        let mut layout = vec![false; tiles];
        for &coord in mines {
            if coord.row >= rows || coord.col >= columns {
                return Err(BoardError::OutOfBounds {
                    coord,
                    rows,
                    columns,
                });
            }

            let slot = &mut layout[coord.row * columns + coord.col];
            if *slot {
                return Err(BoardError::InvalidConfiguration {
                    rows,
                    columns,
                    mines: mines.len(),
                });
            }
            *slot = true;
        }

        Ok(Self::from_layout(rows, columns, layout))
    }

    fn from_layout(rows: usize, columns: usize, layout: Vec<bool>) -> Self {
        let mut tiles = Vec::with_capacity(layout.len());
        let mut mines = Vec::new();

        for (index, &mine) in layout.iter().enumerate() {
            let coord = Coord::new(index / columns, index % columns);
            if mine {
                mines.push(coord);
            }

            let adjacent = neighbours_of(rows, columns, coord)
                .filter(|n| layout[n.row * columns + n.col])
                .count() as u8;

            tiles.push(Tile {
                mine,
                adjacent,
                ..Tile::default()
            });
        }

        Self {
            rows,
            columns,
            tiles,
            mines,
            opened: 0,
            flagged: 0,
            win_rule: WinRule::default(),
        }
    }

    pub fn with_win_rule(mut self, win_rule: WinRule) -> Self {
        self.win_rule = win_rule;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn mine_count(&self) -> usize {
        self.mines.len()
    }

    pub fn win_rule(&self) -> WinRule {
        self.win_rule
    }

    /// Coordinates of every mine, row-major.
    pub fn mines(&self) -> &[Coord] {
        &self.mines
    }

    pub fn opened_count(&self) -> usize {
        self.opened
    }

    pub fn flag_count(&self) -> usize {
        self.flagged
    }

    /// Mines minus flags, as shown on a mine counter. Never negative.
    pub fn remaining_mines(&self) -> usize {
        self.mine_count().saturating_sub(self.flagged)
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.row < self.rows && coord.col < self.columns
    }

    /// In-bounds Moore neighbours of `coord`.
    pub fn neighbours(&self, coord: Coord) -> impl Iterator<Item = Coord> + use<> {
        neighbours_of(self.rows, self.columns, coord)
    }

    /// Every coordinate on the board, row-major.
    pub fn coords(&self) -> impl Iterator<Item = Coord> + use<> {
        let columns = self.columns;
        (0..self.tiles.len()).map(move |index| Coord::new(index / columns, index % columns))
    }

    fn index(&self, coord: Coord) -> Result<usize> {
        if self.contains(coord) {
            Ok(self.offset(coord))
        } else {
            Err(BoardError::OutOfBounds {
                coord,
                rows: self.rows,
                columns: self.columns,
            })
        }
    }

    fn offset(&self, coord: Coord) -> usize {
        coord.row * self.columns + coord.col
    }

    fn tile(&self, coord: Coord) -> Result<&Tile> {
        self.index(coord).map(|index| &self.tiles[index])
    }

    pub fn is_mine(&self, coord: Coord) -> Result<bool> {
        self.tile(coord).map(|tile| tile.mine)
    }

    pub fn adjacent_count(&self, coord: Coord) -> Result<u8> {
        self.tile(coord).map(|tile| tile.adjacent)
    }

    pub fn is_open(&self, coord: Coord) -> Result<bool> {
        self.tile(coord).map(|tile| tile.open)
    }

    pub fn is_flagged(&self, coord: Coord) -> Result<bool> {
        self.tile(coord).map(|tile| tile.flagged)
    }

    /// What a player is allowed to see of `coord`.
    pub fn view(&self, coord: Coord) -> Result<Cell> {
        self.tile(coord).map(player_view)
    }

    /// Player view of the whole board, one inner vector per row.
    pub fn field(&self) -> Vec<Vec<Cell>> {
        self.tiles
            .chunks(self.columns)
            .map(|row| row.iter().map(player_view).collect())
            .collect()
    }

    /// Flips the flag on a closed tile and returns the new flag state.
    /// Open tiles are left alone and report `false`.
    #[instrument(level = "trace", skip(self))]
    pub fn toggle_flag(&mut self, coord: Coord) -> Result<bool> {
        let index = self.index(coord)?;
        let tile = &mut self.tiles[index];

        if tile.open {
            trace!("Ignoring flag on open tile ({}, {})", coord.row, coord.col);
            return Ok(false);
        }

        tile.flagged = !tile.flagged;
        if tile.flagged {
            self.flagged += 1;
        } else {
            self.flagged -= 1;
        }

        Ok(tile.flagged)
    }

    /// Opens `coord`, cascading through zero tiles without any depth cap.
    pub fn reveal(&mut self, coord: Coord) -> Result<Reveal> {
        self.reveal_with_limit(coord, None)
    }

    /// Opens `coord` and, if it has no mined neighbours, cascades outwards
    /// breadth-first through connected zero tiles and their numbered border.
    ///
    /// `max_depth` caps how many steps the cascade may travel from the
    /// requested tile (the requested tile is step 0). This is not standard
    /// minesweeper: a capped cascade can stop in the middle of a zero region
    /// and leave it partly closed. Pass `None` for the normal game.
    #[instrument(level = "trace", skip(self))]
    pub fn reveal_with_limit(&mut self, coord: Coord, max_depth: Option<usize>) -> Result<Reveal> {
        let index = self.index(coord)?;
        let tile = self.tiles[index];

        if tile.open || tile.flagged {
            trace!("Reveal of ({}, {}) is a no-op", coord.row, coord.col);
            return Ok(Reveal::Unchanged);
        }

        self.open(index);

        if tile.mine {
            debug!("Mine detonated at ({}, {})", coord.row, coord.col);
            return Ok(Reveal::Detonated(coord));
        }

        let mut opened = vec![coord];
        let mut queue = VecDeque::from([(coord, 0usize)]);

        // tiles are marked open before they are queued, so each is queued once
        while let Some((current, depth)) = queue.pop_front() {
            if self.tiles[self.offset(current)].adjacent != 0 {
                continue;
            }
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            for next in neighbours_of(self.rows, self.columns, current) {
                let index = self.offset(next);
                let tile = self.tiles[index];
                if tile.open || tile.flagged {
                    continue;
                }
                debug_assert!(!tile.mine, "zero tile bordering a mine");

                self.open(index);
                opened.push(next);
                queue.push_back((next, depth + 1));
            }
        }

        debug!(
            "Revealed ({}, {}), {} tiles opened",
            coord.row,
            coord.col,
            opened.len()
        );
        Ok(Reveal::Opened(opened))
    }

    fn open(&mut self, index: usize) {
        self.tiles[index].open = true;
        self.opened += 1;
    }

    /// True once a mine has been opened.
    pub fn is_detonated(&self) -> bool {
        self.mines
            .iter()
            .any(|&mine| self.tiles[self.offset(mine)].open)
    }

    /// True when the board satisfies its [`WinRule`]. A detonated board never wins.
    pub fn check_win(&self) -> bool {
        if self.is_detonated() {
            return false;
        }

        let cleared = self.opened == self.tiles.len() - self.mines.len();
        match self.win_rule {
            WinRule::ClearSafeTiles => cleared,
            WinRule::ClearAndFlag => {
                cleared
                    && self
                        .mines
                        .iter()
                        .all(|&mine| self.tiles[self.offset(mine)].flagged)
            }
        }
    }

    /// Renders every tile, hidden or not.
    pub fn solution(&self) -> Solution<'_> {
        Solution(self)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, glyph: impl Fn(&Tile) -> char) -> fmt::Result {
        let label_width = row_label(self.rows - 1).len();
        let cell_width = (self.columns - 1).to_string().len();

        write!(f, "{:label_width$}", "")?;
        for col in 0..self.columns {
            write!(f, " {col:>cell_width$}")?;
        }
        writeln!(f)?;

        for (row, tiles) in self.tiles.chunks(self.columns).enumerate() {
            write!(f, "{:<label_width$}", row_label(row))?;
            for tile in tiles {
                write!(f, " {:>cell_width$}", glyph(tile))?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

fn count_glyph(adjacent: u8) -> char {
    match adjacent {
        0 => '.',
        n => char::from(b'0' + n),
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, |tile| match player_view(tile) {
            Cell::Hidden => '#',
            Cell::Flagged => 'F',
            Cell::Revealed { adjacent } => count_glyph(adjacent),
            Cell::Mine => '*',
        })
    }
}

/// Display adapter showing the full mine layout of a board.
pub struct Solution<'a>(&'a Board);

impl fmt::Display for Solution<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.render(f, |tile| {
            if tile.mine {
                '*'
            } else {
                count_glyph(tile.adjacent)
            }
        })
    }
}

fn player_view(tile: &Tile) -> Cell {
    match tile {
        Tile { open: true, mine: true, .. } => Cell::Mine,
        Tile { open: true, adjacent, .. } => Cell::Revealed { adjacent: *adjacent },
        Tile { flagged: true, .. } => Cell::Flagged,
        _ => Cell::Hidden,
    }
}
