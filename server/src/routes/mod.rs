use std::sync::Arc;

use dashmap::Entry;
use nanoid::nanoid;
use rocket::{State, futures::StreamExt, get, http::Status, post, serde::json::Json};
use rocket_ws::{Channel, Message, WebSocket};
use sweeper_core::{
    models::{CreateResponse, GameParams},
    protocol::ClientMessage,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::Settings,
    logic::{Session, Sessions},
    rate_limit::{ClientIp, RateLimiter, check_rate_limit},
};

#[instrument(level = "trace", skip(sessions, session))]
fn add_session(sessions: &Sessions, session: Session) -> String {
    let mut id_length = 5;
    let max_attempts_per_length = 10;
    let session = Arc::new(Mutex::new(session));

    loop {
        for _ in 0..max_attempts_per_length {
            let id = nanoid!(id_length);
            match sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Game ID collision, trying another: {}", id);
                    continue;
                }
                Entry::Vacant(entry) => {
                    entry.insert(session);
                    info!("Created new game with ID: {}", id);
                    return id;
                }
            }
        }

        warn!(
            "Exhausted ID attempts at length {}, increasing to {}",
            id_length,
            id_length + 1
        );
        id_length += 1;
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "ok"
}

#[post("/create", data = "<params>")]
#[instrument(level = "trace", skip(sessions, rate_limiter, settings), fields(client_ip = %client_ip.0, rows = params.rows, columns = params.columns, mines = params.mines))]
pub fn create_game(
    params: Json<GameParams>,
    sessions: &State<Sessions>,
    rate_limiter: &State<RateLimiter>,
    settings: &State<Settings>,
    client_ip: ClientIp,
) -> Result<Json<CreateResponse>, Status> {
    info!(
        "Game creation request from {}: {}x{} with {} mines",
        client_ip.0, params.rows, params.columns, params.mines
    );

    check_rate_limit(rate_limiter, settings, &client_ip.0)?;

    let session = Session::new(params.into_inner(), settings).map_err(|e| {
        warn!("Rejected game parameters from {}: {}", client_ip.0, e);
        Status::UnprocessableEntity
    })?;
    let id = add_session(sessions, session);

    info!(
        "Successfully created game {} for client {}",
        id, client_ip.0
    );
    Ok(Json(CreateResponse { id }))
}

#[get("/ws?<id>")]
#[instrument(level = "trace", skip(ws, sessions), fields(game_id = %id))]
pub fn websocket_handler(
    ws: WebSocket,
    sessions: &State<Sessions>,
    id: String,
) -> Result<Channel<'static>, Status> {
    let session = match sessions.get(&id) {
        None => {
            warn!("WebSocket connection attempt for non-existent game: {}", id);
            return Err(Status::NotFound);
        }
        Some(value) => value.value().clone(),
    };

    // single player per game; a locked session is mid-move and checked again on attach
    if let Ok(guard) = session.try_lock()
        && guard.has_player()
    {
        warn!("Game {} already has a player", id);
        return Err(Status::Conflict);
    }

    info!("WebSocket connection established for game: {}", id);

    Ok(ws.channel(move |stream| {
        let game_id = id.clone();
        Box::pin(async move {
            let (write, mut read) = stream.split();

            let player_id = {
                let mut session = session.lock().await;
                session.attach(write).await
            };
            let Some(player_id) = player_id else {
                return Ok(());
            };

            info!("Player {} joined game {}", player_id, game_id);

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            debug!("Received message from game {}: {:?}", game_id, message);
                            let mut session = session.lock().await;
                            session.handle(message).await;
                        }
                        Err(e) => {
                            warn!(
                                "Invalid message format in game {}: {} - Error: {}",
                                game_id, text, e
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(
                            "WebSocket connection closed for game {} (player: {})",
                            game_id, player_id
                        );
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(e) => {
                        error!(
                            "WebSocket error in game {} (player: {}): {}",
                            game_id, player_id, e
                        );
                        break;
                    }
                    _ => {
                        debug!("Received non-text message in game {}, closing", game_id);
                        break;
                    }
                }
            }

            {
                let mut session = session.lock().await;
                session.detach(&player_id);
            }

            info!("Player {} left game {}", player_id, game_id);
            Ok(())
        })
    }))
}
