//! Configuration loading for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` unless
//! `PARLEY_DATA_DIR` says otherwise) into [`ParleyConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use parley_types::config::ParleyConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";

/// The data directory: `PARLEY_DATA_DIR`, else `~/.parley`, else `./.parley`.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".parley"),
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`ParleyConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> ParleyConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ParleyConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ParleyConfig::default();
        }
    };

    match toml::from_str::<ParleyConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ParleyConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::config::StoreBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.chat.messages_limit, 10);
        assert_eq!(config.chat.max_chat_messages, 1000);
        assert_eq!(config.session.lifetime_secs, 86_400);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[chat]
messages_limit = 25

[store]
backend = "memory"

[session]
refresh_threshold_secs = 120
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.chat.messages_limit, 25);
        assert_eq!(config.chat.max_chat_messages, 1000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.session.refresh_threshold_secs, 120);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is [[not valid")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.chat.messages_limit, 10);
    }
}
