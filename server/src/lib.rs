use std::sync::Arc;

use dashmap::DashMap;
use rocket::{
    Build, Rocket,
    fairing::{Fairing, Info, Kind},
    routes,
};
use tracing::{info, warn};

pub mod cleanup;
pub mod config;
pub mod cors;
pub mod logic;
pub mod rate_limit;
pub mod routes;

use crate::{
    cleanup::start_cleanup_task,
    config::Settings,
    cors::create_cors,
    logic::Sessions,
    rate_limit::create_rate_limiter,
    routes::{create_game, health, websocket_handler},
};

struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<rocket::Orbit>) {
        match (rocket.state::<Sessions>(), rocket.state::<Settings>()) {
            (Some(sessions), Some(settings)) => {
                info!("Starting cleanup task for game management");
                let sessions = sessions.clone();
                let settings = settings.clone();
                tokio::spawn(async move {
                    start_cleanup_task(sessions, settings).await;
                });
            }
            _ => warn!("Failed to get game state for cleanup task"),
        }
    }
}

/// Assembles the server with its managed state, fairings and routes.
pub fn build_rocket(settings: Settings) -> Result<Rocket<Build>, rocket_cors::Error> {
    let sessions: Sessions = Arc::new(DashMap::new());
    let rate_limiter = create_rate_limiter();
    let cors = create_cors(&settings)?;

    info!(
        "Configured with win rule {:?}, cascade depth limit {:?}",
        settings.win_rule, settings.cascade_depth_limit
    );

    Ok(rocket::build()
        .attach(cors)
        .attach(CleanupFairing)
        .manage(sessions)
        .manage(rate_limiter)
        .manage(settings)
        .mount("/", routes![create_game, websocket_handler, health]))
}
