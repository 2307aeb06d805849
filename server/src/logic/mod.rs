use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use rocket::futures::{SinkExt, stream::SplitSink};
use rocket_ws::{Message, stream::DuplexStream};
use sweeper_core::{
    Board, BoardError, Coord, Reveal,
    models::{Cell, GameParams},
    protocol::{CellUpdate, ClientMessage, ServerMessage},
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Settings;

pub type Sessions = Arc<DashMap<String, Arc<Mutex<Session>>>>;

type PlayerSink = SplitSink<DuplexStream, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Playing,
    Won,
    Lost,
}

/// One player's game: the board plus the socket it is being played over.
pub struct Session {
    board: Board,
    status: GameStatus,
    player: Option<Uuid>,
    sink: Option<PlayerSink>,
    created_at: Instant,
    last_activity: Instant,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    cascade_limit: Option<usize>,
    max_tiles: usize,
}

async fn send(stream: &mut PlayerSink, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => {
            if let Err(e) = stream.send(Message::Text(text)).await {
                warn!("Failed to send message to player: {}", e);
            }
        }
        Err(e) => warn!("Failed to serialize server message: {}", e),
    }
}

/// Rejects boards above the tile cap before anything is allocated for them.
fn check_size(params: &GameParams, max_tiles: usize) -> Result<(), BoardError> {
    match params.rows.checked_mul(params.columns) {
        Some(tiles) if tiles <= max_tiles => Ok(()),
        _ => {
            warn!(
                "Board of {}x{} exceeds the {} tile limit",
                params.rows, params.columns, max_tiles
            );
            Err(BoardError::InvalidConfiguration {
                rows: params.rows,
                columns: params.columns,
                mines: params.mines,
            })
        }
    }
}

fn error_message(error: BoardError) -> ServerMessage {
    ServerMessage::Error {
        message: error.to_string(),
    }
}

impl Session {
    #[instrument(level = "trace", skip(settings))]
    pub fn new(params: GameParams, settings: &Settings) -> Result<Self, BoardError> {
        info!(
            "Creating new game: {}x{} with {} mines",
            params.rows, params.columns, params.mines
        );
        check_size(&params, settings.max_tiles)?;
        let board = Board::new(params.rows, params.columns, params.mines)?
            .with_win_rule(settings.win_rule);
        Ok(Self::from_board(board, settings))
    }

    /// Wraps an existing board. Only the cascade cap and the tile cap are taken from `settings`.
    pub fn from_board(board: Board, settings: &Settings) -> Self {
        let now = Instant::now();
        Self {
            board,
            status: GameStatus::Playing,
            player: None,
            sink: None,
            created_at: now,
            last_activity: now,
            started_at: None,
            finished_at: None,
            cascade_limit: settings.cascade_depth_limit,
            max_tiles: settings.max_tiles,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Time since the first move, frozen once the game is over.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    fn start_clock(&mut self) {
        self.started_at.get_or_insert_with(Instant::now);
    }

    fn finish(&mut self, status: GameStatus) {
        self.status = status;
        self.finished_at = Some(Instant::now());
    }

    fn evaluate_win(&mut self) {
        if self.board.check_win() {
            self.finish(GameStatus::Won);
            info!(
                "Game won in {:.1}s ({:?})",
                self.elapsed().as_secs_f64(),
                self.board.win_rule()
            );
        }
    }

    pub fn init_message(&self) -> ServerMessage {
        ServerMessage::Init {
            rows: self.board.rows(),
            columns: self.board.columns(),
            mines: self.board.mine_count(),
            field: self.board.field(),
        }
    }

    fn update_message(&self, updates: Vec<CellUpdate>) -> ServerMessage {
        ServerMessage::Update {
            updates,
            won: self.status == GameStatus::Won,
            lost: self.status == GameStatus::Lost,
            remaining_mines: self.board.remaining_mines(),
            elapsed_ms: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn cell_updates(&self, tiles: &[Coord]) -> Vec<CellUpdate> {
        tiles
            .iter()
            .filter_map(|&pos| {
                self.board
                    .view(pos)
                    .ok()
                    .map(|value| CellUpdate { pos, value })
            })
            .collect()
    }

    /// Applies a player message and returns the reply for the player, if any.
    pub fn apply(&mut self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Reveal { pos } => self.apply_reveal(pos),
            ClientMessage::Flag { pos } => self.apply_flag(pos),
            ClientMessage::Restart { params } => Some(self.apply_restart(params)),
        }
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn apply_reveal(&mut self, pos: Coord) -> Option<ServerMessage> {
        if self.status != GameStatus::Playing {
            debug!(
                "Ignoring reveal action on finished game at ({}, {})",
                pos.row, pos.col
            );
            return None;
        }

        self.last_activity = Instant::now();

        let outcome = match self.board.reveal_with_limit(pos, self.cascade_limit) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Invalid reveal position: {}", e);
                return Some(error_message(e));
            }
        };

        let updates = match outcome {
            Reveal::Unchanged => {
                debug!(
                    "Ignoring reveal on open or flagged tile ({}, {})",
                    pos.row, pos.col
                );
                return None;
            }
            Reveal::Detonated(mine) => {
                self.start_clock();
                self.finish(GameStatus::Lost);
                warn!("Player hit mine at ({}, {}) - game over!", pos.row, pos.col);

                // the detonated tile first, then the rest of the layout for display
                std::iter::once(mine)
                    .chain(self.board.mines().iter().copied().filter(|&m| m != mine))
                    .map(|pos| CellUpdate {
                        pos,
                        value: Cell::Mine,
                    })
                    .collect()
            }
            Reveal::Opened(tiles) => {
                self.start_clock();
                let updates = self.cell_updates(&tiles);
                self.evaluate_win();
                if self.status == GameStatus::Playing {
                    debug!("Revealed {} tiles, game continues", updates.len());
                }
                updates
            }
        };

        Some(self.update_message(updates))
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn apply_flag(&mut self, pos: Coord) -> Option<ServerMessage> {
        if self.status != GameStatus::Playing {
            debug!(
                "Ignoring flag action on finished game at ({}, {})",
                pos.row, pos.col
            );
            return None;
        }

        self.last_activity = Instant::now();

        let board = &mut self.board;
        let toggled = board.is_open(pos).and_then(|open| {
            if open {
                Ok(None)
            } else {
                board.toggle_flag(pos).map(Some)
            }
        });

        let flagged = match toggled {
            Ok(Some(flagged)) => flagged,
            Ok(None) => {
                debug!(
                    "Ignoring flag action on open tile ({}, {})",
                    pos.row, pos.col
                );
                return None;
            }
            Err(e) => {
                warn!("Invalid flag position: {}", e);
                return Some(error_message(e));
            }
        };

        debug!(
            "Tile ({}, {}) {}",
            pos.row,
            pos.col,
            if flagged { "flagged" } else { "unflagged" }
        );
        self.start_clock();
        self.evaluate_win();

        let value = if flagged { Cell::Flagged } else { Cell::Hidden };
        Some(self.update_message(vec![CellUpdate { pos, value }]))
    }

    /// Replaces the board with a fresh one. Invalid parameters leave the current game untouched.
    #[instrument(level = "trace", skip(self))]
    pub fn apply_restart(&mut self, params: GameParams) -> ServerMessage {
        info!(
            "Restarting game with new parameters: {}x{} with {} mines",
            params.rows, params.columns, params.mines
        );

        let board = check_size(&params, self.max_tiles)
            .and_then(|()| Board::new(params.rows, params.columns, params.mines));
        let board = match board {
            Ok(board) => board.with_win_rule(self.board.win_rule()),
            Err(e) => {
                warn!("Rejected restart: {}", e);
                return error_message(e);
            }
        };

        self.board = board;
        self.status = GameStatus::Playing;
        self.started_at = None;
        self.finished_at = None;
        self.last_activity = Instant::now();

        self.init_message()
    }

    pub async fn handle(&mut self, message: ClientMessage) {
        if let Some(reply) = self.apply(message) {
            self.send_to_player(&reply).await;
        }
    }

    async fn send_to_player(&mut self, message: &ServerMessage) {
        if let Some(stream) = self.sink.as_mut() {
            send(stream, message).await;
        }
    }

    /// Reserves the session's only player slot. Returns `None` when it is taken.
    pub fn claim_player(&mut self) -> Option<Uuid> {
        if let Some(id) = &self.player {
            warn!("Refusing second connection, player {} is attached", id);
            return None;
        }

        let id = Uuid::new_v4();
        self.player = Some(id);
        self.last_activity = Instant::now();
        Some(id)
    }

    /// Claims the player slot for `stream` and sends it the board.
    #[instrument(level = "trace", skip(self, stream))]
    pub async fn attach(&mut self, mut stream: PlayerSink) -> Option<Uuid> {
        let id = self.claim_player()?;
        send(&mut stream, &self.init_message()).await;
        self.sink = Some(stream);
        info!("Player {} attached", id);
        Some(id)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn detach(&mut self, id: &Uuid) {
        match &self.player {
            Some(current) if current == id => {
                self.player = None;
                self.sink = None;
                info!("Player {} detached", id);
            }
            _ => warn!("Attempted to detach unknown player: {}", id),
        }
        self.last_activity = Instant::now();
    }

    pub fn has_player(&self) -> bool {
        self.player.is_some()
    }

    pub fn should_cleanup(
        &self,
        now: Instant,
        inactive_timeout: Duration,
        active_timeout: Duration,
    ) -> bool {
        if now.duration_since(self.created_at) > active_timeout {
            return true;
        }

        !self.has_player() && now.duration_since(self.last_activity) > inactive_timeout
    }
}

#[cfg(test)]
mod tests {
    use sweeper_core::WinRule;

    use super::*;

    fn c(row: usize, col: usize) -> Coord {
        Coord::new(row, col)
    }

    fn corner_session() -> Session {
        Session::from_board(
            Board::from_mines(5, 5, &[c(0, 0)]).unwrap(),
            &Settings::default(),
        )
    }

    #[test]
    fn test_cascade_then_flag_wins() {
        let mut session = corner_session();

        let Some(ServerMessage::Update {
            updates, won, lost, ..
        }) = session.apply_reveal(c(4, 4))
        else {
            panic!("expected an update");
        };
        assert_eq!(24, updates.len());
        assert!(!won && !lost);
        assert_eq!(GameStatus::Playing, session.status());

        let Some(ServerMessage::Update {
            updates,
            won,
            remaining_mines,
            ..
        }) = session.apply_flag(c(0, 0))
        else {
            panic!("expected an update");
        };
        assert_eq!(
            vec![CellUpdate {
                pos: c(0, 0),
                value: Cell::Flagged
            }],
            updates
        );
        assert!(won);
        assert_eq!(0, remaining_mines);
        assert_eq!(GameStatus::Won, session.status());

        assert_eq!(None, session.apply_flag(c(0, 0)));
        assert!(session.board().is_flagged(c(0, 0)).unwrap());
    }

    #[test]
    fn test_clear_rule_wins_without_flags() {
        let board = Board::from_mines(5, 5, &[c(0, 0)])
            .unwrap()
            .with_win_rule(WinRule::ClearSafeTiles);
        let mut session = Session::from_board(board, &Settings::default());

        assert!(matches!(
            session.apply_reveal(c(4, 4)),
            Some(ServerMessage::Update { won: true, .. })
        ));
        assert_eq!(GameStatus::Won, session.status());
    }

    #[test]
    fn test_mine_ends_game_and_shows_layout() {
        let board = Board::from_mines(3, 3, &[c(0, 0), c(2, 2)]).unwrap();
        let mut session = Session::from_board(board, &Settings::default());

        let Some(ServerMessage::Update { updates, lost, .. }) = session.apply_reveal(c(2, 2)) else {
            panic!("expected an update");
        };
        assert!(lost);
        assert_eq!(
            vec![
                CellUpdate {
                    pos: c(2, 2),
                    value: Cell::Mine
                },
                CellUpdate {
                    pos: c(0, 0),
                    value: Cell::Mine
                },
            ],
            updates
        );
        assert_eq!(GameStatus::Lost, session.status());
        assert!(!session.board().is_open(c(0, 0)).unwrap());
        assert_eq!(1, session.board().opened_count());

        assert_eq!(None, session.apply_reveal(c(1, 1)));
        assert!(!session.board().is_open(c(1, 1)).unwrap());
    }

    #[test]
    fn test_out_of_bounds_reports_error() {
        let mut session = corner_session();
        assert!(matches!(
            session.apply_reveal(c(5, 0)),
            Some(ServerMessage::Error { .. })
        ));
        assert!(matches!(
            session.apply_flag(c(0, 9)),
            Some(ServerMessage::Error { .. })
        ));
        assert_eq!(GameStatus::Playing, session.status());
    }

    #[test]
    fn test_noops_send_nothing() {
        let mut session = corner_session();
        session.apply_reveal(c(1, 1));

        assert_eq!(None, session.apply_reveal(c(1, 1)));
        assert_eq!(None, session.apply_flag(c(1, 1)));

        session.apply_flag(c(4, 4));
        assert_eq!(None, session.apply_reveal(c(4, 4)));
    }

    #[test]
    fn test_unflag_reports_hidden() {
        let mut session = corner_session();
        session.apply_flag(c(3, 3));

        let Some(ServerMessage::Update { updates, .. }) = session.apply_flag(c(3, 3)) else {
            panic!("expected an update");
        };
        assert_eq!(Cell::Hidden, updates[0].value);
    }

    #[test]
    fn test_cascade_limit_is_forwarded() {
        let board = Board::from_mines(1, 6, &[c(0, 0)]).unwrap();
        let settings = Settings {
            cascade_depth_limit: Some(1),
            ..Settings::default()
        };
        let mut session = Session::from_board(board, &settings);

        let Some(ServerMessage::Update { updates, .. }) = session.apply_reveal(c(0, 5)) else {
            panic!("expected an update");
        };
        assert_eq!(2, updates.len());
    }

    #[test]
    fn test_restart() {
        let mut session = corner_session();
        session.apply_reveal(c(0, 0));
        assert_eq!(GameStatus::Lost, session.status());

        let reply = session.apply_restart(GameParams {
            rows: 4,
            columns: 4,
            mines: 16,
        });
        assert!(matches!(reply, ServerMessage::Error { .. }));
        assert_eq!(5, session.board().rows());
        assert_eq!(GameStatus::Lost, session.status());

        let reply = session.apply_restart(GameParams {
            rows: 4,
            columns: 6,
            mines: 3,
        });
        let ServerMessage::Init {
            rows,
            columns,
            mines,
            field,
        } = reply
        else {
            panic!("expected init");
        };
        assert_eq!((4, 6, 3), (rows, columns, mines));
        assert!(field.iter().flatten().all(|cell| *cell == Cell::Hidden));
        assert_eq!(GameStatus::Playing, session.status());
        assert_eq!(Duration::ZERO, session.elapsed());
    }

    #[test]
    fn test_restart_above_tile_cap_is_rejected() {
        let settings = Settings {
            max_tiles: 100,
            ..Settings::default()
        };
        let mut session =
            Session::from_board(Board::from_mines(5, 5, &[c(0, 0)]).unwrap(), &settings);

        let reply = session.apply_restart(GameParams {
            rows: 11,
            columns: 10,
            mines: 1,
        });
        assert!(matches!(reply, ServerMessage::Error { .. }));
        assert_eq!((5, 5), (session.board().rows(), session.board().columns()));

        let reply = session.apply_restart(GameParams {
            rows: usize::MAX,
            columns: 2,
            mines: 1,
        });
        assert!(matches!(reply, ServerMessage::Error { .. }));

        let reply = session.apply_restart(GameParams {
            rows: 10,
            columns: 10,
            mines: 1,
        });
        assert!(matches!(reply, ServerMessage::Init { rows: 10, .. }));
    }

    #[test]
    fn test_new_rejects_oversized_board() {
        let settings = Settings {
            max_tiles: 100,
            ..Settings::default()
        };
        let params = GameParams {
            rows: 60000,
            columns: 60000,
            mines: 1,
        };
        assert!(matches!(
            Session::new(params, &settings),
            Err(BoardError::InvalidConfiguration { rows: 60000, .. })
        ));
    }

    #[test]
    fn test_one_player_at_a_time() {
        let mut session = corner_session();
        assert!(!session.has_player());

        let first = session.claim_player().unwrap();
        assert!(session.has_player());
        assert_eq!(None, session.claim_player());

        session.detach(&Uuid::new_v4());
        assert!(session.has_player());

        session.detach(&first);
        assert!(!session.has_player());

        let second = session.claim_player().unwrap();
        assert_ne!(first, second);
        assert!(session.has_player());
    }

    #[test]
    fn test_clock_starts_on_first_move_and_freezes() {
        let mut session = corner_session();
        assert_eq!(Duration::ZERO, session.elapsed());

        session.apply_reveal(c(0, 0));
        let frozen = session.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(frozen, session.elapsed());
    }

    #[test]
    fn test_should_cleanup() {
        let session = corner_session();
        let minute = Duration::from_secs(60);
        let day = Duration::from_secs(86400);

        assert!(!session.should_cleanup(session.created_at, minute, day));
        assert!(session.should_cleanup(session.created_at + 2 * minute, minute, day));
        assert!(session.should_cleanup(session.created_at + 2 * day, 3 * day, day));
    }

    #[test]
    fn test_init_message_hides_layout() {
        let session = corner_session();
        let ServerMessage::Init { field, mines, .. } = session.init_message() else {
            panic!("expected init");
        };
        assert_eq!(1, mines);
        assert_eq!(5, field.len());
        assert!(field.iter().all(|row| row.len() == 5));
        assert!(field.iter().flatten().all(|cell| *cell == Cell::Hidden));
    }
}
