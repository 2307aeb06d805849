use std::{env, str::FromStr, time::Duration};

use sweeper_core::WinRule;
use tracing::warn;

/// Runtime settings, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub games_per_minute: u32,
    pub cleanup_interval: Duration,
    pub inactive_timeout: Duration,
    pub active_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
    /// Non-standard cascade cap handed to every reveal. `None` plays normal minesweeper.
    pub cascade_depth_limit: Option<usize>,
    pub win_rule: WinRule,
    /// Largest board a client may request, in tiles.
    pub max_tiles: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            games_per_minute: 10,
            cleanup_interval: Duration::from_secs(60),
            inactive_timeout: Duration::from_secs(600),
            active_timeout: Duration::from_secs(86400),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            cascade_depth_limit: None,
            win_rule: WinRule::default(),
            max_tiles: 10_000,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_var(key, lookup(key), default.as_secs()))
        };

        let cors_allowed_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_allowed_origins,
        };

        let cascade_depth_limit = lookup("CASCADE_DEPTH_LIMIT")
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| match raw.trim().parse() {
                Ok(limit) => Some(limit),
                Err(_) => {
                    warn!("Ignoring unparsable CASCADE_DEPTH_LIMIT={:?}", raw);
                    None
                }
            });

        Self {
            games_per_minute: parse_var(
                "RATE_LIMIT_GAMES_PER_MINUTE",
                lookup("RATE_LIMIT_GAMES_PER_MINUTE"),
                defaults.games_per_minute,
            ),
            cleanup_interval: secs("CLEANUP_INTERVAL_SECONDS", defaults.cleanup_interval),
            inactive_timeout: secs("INACTIVE_GAME_TIMEOUT_SECONDS", defaults.inactive_timeout),
            active_timeout: secs("ACTIVE_GAME_TIMEOUT_SECONDS", defaults.active_timeout),
            cors_allowed_origins,
            cascade_depth_limit,
            win_rule: parse_var("WIN_RULE", lookup("WIN_RULE"), defaults.win_rule),
            max_tiles: parse_var("MAX_TILES", lookup("MAX_TILES"), defaults.max_tiles),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = settings(&[]);
        assert_eq!(10, settings.games_per_minute);
        assert_eq!(Duration::from_secs(600), settings.inactive_timeout);
        assert_eq!(vec!["http://localhost:5173"], settings.cors_allowed_origins);
        assert_eq!(None, settings.cascade_depth_limit);
        assert_eq!(WinRule::ClearAndFlag, settings.win_rule);
        assert_eq!(10_000, settings.max_tiles);
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("RATE_LIMIT_GAMES_PER_MINUTE", "3"),
            ("CLEANUP_INTERVAL_SECONDS", " 5 "),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("CASCADE_DEPTH_LIMIT", "4"),
            ("WIN_RULE", "clear"),
            ("MAX_TILES", "2500"),
        ]);
        assert_eq!(3, settings.games_per_minute);
        assert_eq!(Duration::from_secs(5), settings.cleanup_interval);
        assert_eq!(
            vec!["https://a.example", "https://b.example"],
            settings.cors_allowed_origins
        );
        assert_eq!(Some(4), settings.cascade_depth_limit);
        assert_eq!(WinRule::ClearSafeTiles, settings.win_rule);
        assert_eq!(2500, settings.max_tiles);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let settings = settings(&[
            ("RATE_LIMIT_GAMES_PER_MINUTE", "lots"),
            ("CASCADE_DEPTH_LIMIT", "deep"),
            ("WIN_RULE", "whenever"),
        ]);
        assert_eq!(10, settings.games_per_minute);
        assert_eq!(None, settings.cascade_depth_limit);
        assert_eq!(WinRule::ClearAndFlag, settings.win_rule);
    }
}
