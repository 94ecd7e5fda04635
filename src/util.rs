use std::path::PathBuf;

const CONFIG_PATH: &str = "TXMON_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "txmon.json";

pub fn get_default_config_path() -> &'static str {
    DEFAULT_CONFIG_PATH
}

/// Config file path from the environment, falling back to `txmon.json`
pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const STATE_DIR: &str = "TXMON_STATE_DIR";

/// Overrides the directory of a file storage backend
pub fn get_state_dir() -> Option<PathBuf> {
    std::env::var(STATE_DIR).ok().map(PathBuf::from)
}

const LOG_LEVEL: &str = "TXMON_LOG";

const DEFAULT_LOG_LEVEL: tracing::Level = tracing::Level::INFO;

pub fn get_log_level() -> tracing::Level {
    let level_from_env = std::env::var(LOG_LEVEL);
    level_from_env.map_or(DEFAULT_LOG_LEVEL, |res| {
        res.parse().unwrap_or(DEFAULT_LOG_LEVEL)
    })
}
