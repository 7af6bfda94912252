//! Configuration loading
//!
//! Settings come from a TOML file resolved in priority order:
//! 1. `MEZZO_CONFIG` environment variable (explicit path)
//! 2. Platform config directory (`~/.config/mezzo/mezzo.toml` on Linux)
//!
//! When no file exists the compiled defaults are used. Provider
//! credentials may additionally be set through environment variables,
//! which take precedence over the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file path.
pub const CONFIG_ENV: &str = "MEZZO_CONFIG";

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    /// Queue admission budgets, one integer per source name
    /// ("transactions per tick"). A partial table is a configuration
    /// error; omit the whole table to get the defaults.
    #[serde(default = "default_sources")]
    pub sources: HashMap<String, u32>,
    #[serde(default)]
    pub expiration: ExpirationConfig,
    #[serde(default)]
    pub spotify: SpotifyCredentials,
    #[serde(default)]
    pub lastfm: LastfmCredentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            sources: default_sources(),
            expiration: ExpirationConfig::default(),
            spotify: SpotifyCredentials::default(),
            lastfm: LastfmCredentials::default(),
        }
    }
}

fn default_sources() -> HashMap<String, u32> {
    HashMap::from([
        ("spotify".to_string(), 10),
        ("deezer".to_string(), 10),
        ("lastfm".to_string(), 10),
        ("palette".to_string(), 2),
    ])
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Durable store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mezzo.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Fast-cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Fast-cache TTLs, in seconds, per entity kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpirationConfig {
    #[serde(default = "default_week")]
    pub artists: u64,
    #[serde(default = "default_week")]
    pub albums: u64,
    #[serde(default = "default_week")]
    pub tracks: u64,
    #[serde(default = "default_day")]
    pub popularity: u64,
    /// TTL of negative ("provider had nothing") markers. Short enough
    /// that a provider adding the entity later is eventually seen.
    #[serde(default = "default_day")]
    pub not_found: u64,
}

fn default_week() -> u64 {
    7 * 24 * 3600
}

fn default_day() -> u64 {
    24 * 3600
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            artists: default_week(),
            albums: default_week(),
            tracks: default_week(),
            popularity: default_day(),
            not_found: default_day(),
        }
    }
}

/// Spotify client-credentials pair.
///
/// `MEZZO_SPOTIFY_ID` / `MEZZO_SPOTIFY_SECRET` override the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpotifyCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl SpotifyCredentials {
    /// Resolve credentials, environment taking precedence over TOML.
    pub fn resolve(&self) -> Result<(String, String)> {
        let id = std::env::var("MEZZO_SPOTIFY_ID")
            .ok()
            .or_else(|| self.client_id.clone());
        let secret = std::env::var("MEZZO_SPOTIFY_SECRET")
            .ok()
            .or_else(|| self.client_secret.clone());

        match (id, secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Ok((id, secret))
            }
            _ => Err(Error::Config(
                "Spotify client id and secret are required \
                 (MEZZO_SPOTIFY_ID / MEZZO_SPOTIFY_SECRET or [spotify] in mezzo.toml)"
                    .to_string(),
            )),
        }
    }
}

/// LastFM API key. `MEZZO_LASTFM_KEY` overrides the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LastfmCredentials {
    pub api_key: Option<String>,
}

impl LastfmCredentials {
    /// Resolve the API key, environment taking precedence over TOML.
    pub fn resolve(&self) -> Result<String> {
        std::env::var("MEZZO_LASTFM_KEY")
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "LastFM client key is required \
                     (MEZZO_LASTFM_KEY or [lastfm] in mezzo.toml)"
                        .to_string(),
                )
            })
    }
}

impl Config {
    /// Load configuration from the resolved path, falling back to
    /// compiled defaults when no file exists.
    pub fn load() -> Result<Self> {
        match resolve_config_path() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load_from(&path)
            }
            None => {
                warn!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
    }
}

/// Resolve the config file path: `MEZZO_CONFIG` first, then the
/// platform config directory. Returns None when neither names an
/// existing file.
fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|dir| dir.join("mezzo").join("mezzo.toml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_queue_sources() {
        let config = Config::default();
        for source in ["spotify", "deezer", "lastfm", "palette"] {
            assert!(config.sources.contains_key(source), "missing {}", source);
        }
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 8080

            [database]
            path = "/tmp/mezzo-test.db"

            [redis]
            url = "redis://cache:6379"

            [sources]
            spotify = 20
            deezer = 15
            lastfm = 5
            palette = 1

            [expiration]
            artists = 3600
            albums = 3600
            tracks = 3600
            popularity = 600
            not_found = 600

            [spotify]
            client_id = "id"
            client_secret = "secret"

            [lastfm]
            api_key = "key"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sources["spotify"], 20);
        assert_eq!(config.expiration.popularity, 600);
        assert_eq!(config.spotify.client_id.as_deref(), Some("id"));
    }

    #[test]
    fn partial_sources_table_is_preserved_verbatim() {
        // Validation of missing budgets happens at queue construction,
        // not at parse time; the parsed map must reflect the file.
        let config: Config = toml::from_str("[sources]\nspotify = 3\n").unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources["spotify"], 3);
    }

    #[test]
    fn missing_sources_table_gets_defaults() {
        let config: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.sources.len(), 4);
    }
}
