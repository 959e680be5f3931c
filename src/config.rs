//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup; a `.env` file is honoured for local
//! development.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Highest zoom the tile math accepts.
pub const MAX_SUPPORTED_ZOOM: u8 = 22;

/// Which document store adapter to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStoreKind {
    Firestore,
    Memory,
}

/// How the archive cache persists tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// In-memory MBTiles with periodic snapshot files.
    Snapshot,
    /// MBTiles file written directly.
    File,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Map client origin allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    pub document_store: DocumentStoreKind,
    /// Secret path segment of the mutation webhook
    pub webhook_path_uuid: String,
    /// Bearer token required on `/tasks/*`
    pub sync_token: String,
    /// SQLite file backing the spatial store
    pub spatial_db_path: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub archive_mode: ArchiveMode,
    /// MBTiles file used in `ArchiveMode::File`
    pub archive_path: PathBuf,
    /// Directory receiving snapshot files in `ArchiveMode::Snapshot`
    pub snapshot_dir: PathBuf,
    pub snapshot_interval: Duration,
    pub snapshot_retention: Duration,
    /// Number of sync queue workers
    pub sync_workers: usize,
    /// Maximum number of queued sync events
    pub sync_queue_capacity: usize,
    /// Queue a full resync when the server starts
    pub resync_on_start: bool,
}

impl Config {
    /// Offline configuration for tests.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            document_store: DocumentStoreKind::Memory,
            webhook_path_uuid: "test-webhook-uuid".to_string(),
            sync_token: "test_sync_token".to_string(),
            spatial_db_path: ":memory:".to_string(),
            min_zoom: 6,
            max_zoom: 18,
            archive_mode: ArchiveMode::Snapshot,
            archive_path: PathBuf::from("data/tiles.mbtiles"),
            snapshot_dir: PathBuf::from("data/snapshots"),
            snapshot_interval: Duration::from_secs(60),
            snapshot_retention: Duration::from_secs(15 * 60),
            sync_workers: 2,
            sync_queue_capacity: 64,
            resync_on_start: false,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let document_store = match env::var("DOCUMENT_STORE")
            .unwrap_or_else(|_| "firestore".to_string())
            .as_str()
        {
            "firestore" => DocumentStoreKind::Firestore,
            "memory" => DocumentStoreKind::Memory,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "DOCUMENT_STORE must be firestore or memory, got {}",
                    other
                )))
            }
        };

        let archive_mode = match env::var("ARCHIVE_MODE")
            .unwrap_or_else(|_| "snapshot".to_string())
            .as_str()
        {
            "snapshot" => ArchiveMode::Snapshot,
            "file" => ArchiveMode::File,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "ARCHIVE_MODE must be snapshot or file, got {}",
                    other
                )))
            }
        };

        let config = Self {
            port: parse_or("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            document_store,
            webhook_path_uuid: env::var("WEBHOOK_PATH_UUID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_PATH_UUID"))?,
            sync_token: env::var("SYNC_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SYNC_TOKEN"))?,
            spatial_db_path: env::var("SPATIAL_DB_PATH")
                .unwrap_or_else(|_| "data/trails.sqlite".to_string()),
            min_zoom: parse_or("MIN_ZOOM", 6)?,
            max_zoom: parse_or("MAX_ZOOM", 18)?,
            archive_mode,
            archive_path: env::var("ARCHIVE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/tiles.mbtiles")),
            snapshot_dir: env::var("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/snapshots")),
            snapshot_interval: Duration::from_secs(parse_or("SNAPSHOT_INTERVAL_SECS", 60)?),
            snapshot_retention: Duration::from_secs(
                parse_or::<u64>("SNAPSHOT_RETENTION_MINUTES", 15)? * 60,
            ),
            sync_workers: parse_or("SYNC_WORKERS", 4)?,
            sync_queue_capacity: parse_or("SYNC_QUEUE_CAPACITY", 256)?,
            resync_on_start: parse_or("RESYNC_ON_START", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "MIN_ZOOM ({}) must not exceed MAX_ZOOM ({})",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(ConfigError::Invalid(format!(
                "MAX_ZOOM must be at most {}",
                MAX_SUPPORTED_ZOOM
            )));
        }
        if self.sync_workers == 0 || self.sync_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "SYNC_WORKERS and SYNC_QUEUE_CAPACITY must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
