use modvault_core::archive::BuilderConfig;
use modvault_core::logbus::LogBusConfig;
use modvault_core::orchestrator::OrchestratorConfig;
use modvault_core::steam::adapter::{AdapterConfig, Credentials};
use modvault_core::sweeper::SweeperConfig;
use modvault_model::AppId;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables, with code
/// defaults matching the documented operational numbers.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Download pipeline settings
    pub download_root: PathBuf,
    pub steamcmd_path: PathBuf,
    pub app_id: AppId,
    pub max_concurrent_downloads: usize,
    pub max_archive_bytes: Option<u64>,
    /// Bound on one fetch and on the stale-job deadline.
    pub job_timeout: Duration,

    // Steam account (anonymous mode when unset)
    pub steam_username: Option<String>,
    pub steam_password: Option<String>,
    pub steam_guard_code: Option<String>,
    /// `HOME` override for the steam client's credential store.
    pub steam_home: Option<PathBuf>,

    // Observability
    pub log_ring_capacity: usize,
    /// Pre-shared token observers present when connecting to the log
    /// stream. The stream rejects every connect while unset.
    pub observer_token: Option<String>,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            download_root: env::var("DOWNLOAD_ROOT")
                .unwrap_or_else(|_| "./downloads".to_string())
                .into(),
            steamcmd_path: env::var("STEAMCMD_PATH")
                .unwrap_or_else(|_| "steamcmd".to_string())
                .into(),
            app_id: env::var("APP_ID")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(AppId(221100)),
            max_concurrent_downloads: env::var("MAX_CONCURRENT_DOWNLOADS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(3),
            max_archive_bytes: env::var("MAX_ARCHIVE_SIZE")
                .ok()
                .and_then(|raw| raw.parse().ok()),
            job_timeout: Duration::from_secs(
                env::var("JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(2 * 60 * 60),
            ),

            steam_username: env::var("STEAM_USERNAME").ok().filter(|s| !s.is_empty()),
            steam_password: env::var("STEAM_PASSWORD").ok().filter(|s| !s.is_empty()),
            steam_guard_code: env::var("STEAM_GUARD_CODE").ok().filter(|s| !s.is_empty()),
            steam_home: env::var("STEAM_HOME").ok().map(PathBuf::from),

            log_ring_capacity: env::var("LOG_RING_CAPACITY")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(1000),
            observer_token: env::var("OBSERVER_TOKEN").ok().filter(|s| !s.is_empty()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.download_root)?;
        if let Some(home) = &self.steam_home {
            std::fs::create_dir_all(home)?;
        }
        Ok(())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.steam_username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.steam_password.clone(),
            guard_code: self.steam_guard_code.clone(),
        })
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            steamcmd_path: self.steamcmd_path.clone(),
            fetch_timeout: self.job_timeout,
            steam_home: self.steam_home.clone(),
            credentials: self.credentials(),
            ..AdapterConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            app_id: self.app_id,
            max_concurrent: self.max_concurrent_downloads,
            max_archive_bytes: self.max_archive_bytes,
            builder: BuilderConfig::default(),
            ..OrchestratorConfig::default()
        }
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            stale_after: self.job_timeout,
            ..SweeperConfig::default()
        }
    }

    pub fn logbus_config(&self) -> LogBusConfig {
        LogBusConfig {
            ring_capacity: self.log_ring_capacity,
            ..LogBusConfig::default()
        }
    }
}
