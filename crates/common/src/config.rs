//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Instance identity.
    pub instance: InstanceConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Media processing configuration.
    #[serde(default)]
    pub media: MediaSettings,
    /// Maintenance scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Instance identity.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Host name of this instance, e.g. `example.org`.
    ///
    /// Mentions addressed to this host are resolved as local.
    pub host: String,
}

/// Local blob storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory blobs are written under.
    #[serde(default = "default_storage_path")]
    pub base_path: PathBuf,
    /// URL prefix blobs are served from.
    #[serde(default = "default_storage_url")]
    pub base_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            base_url: default_storage_url(),
        }
    }
}

/// Media processing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// Longest edge of generated thumbnails, in pixels.
    #[serde(default = "default_thumbnail_max_dimension")]
    pub thumbnail_max_dimension: u32,
    /// JPEG quality of generated thumbnails (1-100).
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Blurhash components along x and y.
    #[serde(default = "default_blurhash_components")]
    pub blurhash_components: (u32, u32),
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            thumbnail_max_dimension: default_thumbnail_max_dimension(),
            thumbnail_quality: default_thumbnail_quality(),
            max_upload_size: default_max_upload_size(),
            blurhash_components: default_blurhash_components(),
        }
    }
}

/// Maintenance scheduler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// How often stuck uploads are re-enqueued, in seconds.
    #[serde(default = "default_requeue_interval")]
    pub requeue_interval_secs: u64,
    /// Age after which a `Received` attachment counts as stuck, in seconds.
    #[serde(default = "default_requeue_after")]
    pub requeue_after_secs: u64,
    /// How long failed attachments are kept before being purged, in seconds.
    #[serde(default = "default_error_retention")]
    pub error_retention_secs: u64,
    /// Time without progress after which a `Processing` attachment is failed,
    /// in seconds.
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            requeue_interval_secs: default_requeue_interval(),
            requeue_after_secs: default_requeue_after(),
            error_retention_secs: default_error_retention(),
            processing_timeout_secs: default_processing_timeout(),
        }
    }
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "tootbox".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./files")
}

fn default_storage_url() -> String {
    "/files".to_string()
}

const fn default_thumbnail_max_dimension() -> u32 {
    512
}

const fn default_thumbnail_quality() -> u8 {
    80
}

const fn default_max_upload_size() -> u64 {
    40 * 1024 * 1024
}

const fn default_blurhash_components() -> (u32, u32) {
    (4, 3)
}

const fn default_requeue_interval() -> u64 {
    300
}

const fn default_requeue_after() -> u64 {
    600
}

const fn default_error_retention() -> u64 {
    7 * 24 * 3600
}

const fn default_processing_timeout() -> u64 {
    1800
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TOOTBOX_ENV`)
    /// 3. Environment variables with `TOOTBOX_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("TOOTBOX_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TOOTBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TOOTBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [database]
                url = "postgres://localhost/tootbox"

                [redis]
                url = "redis://localhost:6379"

                [instance]
                host = "example.org"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.redis.prefix, "tootbox");
        assert_eq!(config.instance.host, "example.org");
        assert_eq!(config.media.thumbnail_max_dimension, 512);
        assert_eq!(config.media.blurhash_components, (4, 3));
        assert_eq!(config.storage.base_url, "/files");
        assert_eq!(config.scheduler.requeue_after_secs, 600);
    }

    #[test]
    fn test_media_overrides() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [database]
                url = "postgres://localhost/tootbox"

                [redis]
                url = "redis://localhost:6379"

                [instance]
                host = "example.org"

                [media]
                thumbnail_max_dimension = 256
                max_upload_size = 1024
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.media.thumbnail_max_dimension, 256);
        assert_eq!(config.media.max_upload_size, 1024);
        assert_eq!(config.media.thumbnail_quality, 80);
    }
}
