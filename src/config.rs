use std::path::PathBuf;
use std::time::Duration;

/// Snapshot file used when `QUIZ_STATE_PATH` is unset, relative to the
/// working directory.
pub const DEFAULT_STATE_FILE: &str = "quiz_state.json";

/// Runtime configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Where the snapshot is kept. `None` keeps it in memory only.
    pub state_path: Option<PathBuf>,
    pub persist_debounce: Duration,
    pub tick_interval: Duration,
    pub auto_advance_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 8080,
            state_path: None,
            persist_debounce: Duration::from_millis(500),
            tick_interval: Duration::from_millis(250),
            auto_advance_delay: Duration::from_millis(1500),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let state_path = match std::env::var("QUIZ_STATE_PATH") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(PathBuf::from(DEFAULT_STATE_FILE)),
        };
        Config {
            host: std::env::var("QUIZ_HOST").unwrap_or(defaults.host),
            port: std::env::var("QUIZ_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            state_path,
            persist_debounce: env_millis("QUIZ_PERSIST_DEBOUNCE_MS", defaults.persist_debounce),
            tick_interval: env_millis("QUIZ_TICK_MS", defaults.tick_interval),
            auto_advance_delay: env_millis("QUIZ_AUTO_ADVANCE_MS", defaults.auto_advance_delay),
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_path_defaults_to_working_directory() {
        std::env::remove_var("QUIZ_STATE_PATH");
        let config = Config::from_env();
        assert_eq!(config.state_path, Some(PathBuf::from(DEFAULT_STATE_FILE)));
        assert!(config.state_path.as_ref().is_some_and(|p| p.is_relative()));

        std::env::set_var("QUIZ_STATE_PATH", "  ");
        assert_eq!(Config::from_env().state_path, None);

        std::env::set_var("QUIZ_STATE_PATH", "/var/lib/quiz/state.json");
        assert_eq!(
            Config::from_env().state_path,
            Some(PathBuf::from("/var/lib/quiz/state.json"))
        );
        std::env::remove_var("QUIZ_STATE_PATH");
    }
}
