use std::time::{Duration, Instant};

use tokio::time;
use tracing::{debug, info};

use crate::{config::Settings, logic::Sessions};

pub async fn start_cleanup_task(sessions: Sessions, settings: Settings) {
    let mut interval = time::interval(settings.cleanup_interval);

    info!(
        "Started game cleanup task: checking every {}s, inactive timeout: {}s, active timeout: {}s",
        settings.cleanup_interval.as_secs(),
        settings.inactive_timeout.as_secs(),
        settings.active_timeout.as_secs()
    );

    loop {
        interval.tick().await;
        cleanup_sessions(
            &sessions,
            Instant::now(),
            settings.inactive_timeout,
            settings.active_timeout,
        );
    }
}

/// Drops expired sessions and returns how many were removed.
pub fn cleanup_sessions(
    sessions: &Sessions,
    now: Instant,
    inactive_timeout: Duration,
    active_timeout: Duration,
) -> usize {
    let mut expired = Vec::new();

    for entry in sessions.iter() {
        // a locked session is in use, look again next tick
        if let Ok(session) = entry.value().try_lock()
            && session.should_cleanup(now, inactive_timeout, active_timeout)
        {
            expired.push(entry.key().clone());
        }
    }

    let removed = expired.len();
    for id in expired {
        sessions.remove(&id);
        debug!("Cleaned up game: {}", id);
    }

    if removed > 0 {
        info!("Cleaned up {} inactive games", removed);
    }
    removed
}
