use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Display name announced to peers; `user@hostname` when unset
    #[serde(default)]
    pub device_name: Option<String>,

    /// `host:port` announced to peers; primary LAN address when unset
    #[serde(default)]
    pub advertise_address: Option<String>,

    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default = "default_inbox_dir")]
    pub inbox_dir: PathBuf,

    #[serde(default = "default_true")]
    pub discovery_enabled: bool,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,

    #[serde(default = "default_retention_timeout_secs")]
    pub retention_timeout_secs: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_control_timeout_secs")]
    pub control_timeout_secs: u64,

    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: String,
}

fn default_port() -> u16 {
    8080
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("file-share").join("staging")
}

fn default_inbox_dir() -> PathBuf {
    std::env::temp_dir().join("file-share").join("received")
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_reaper_interval_secs() -> u64 {
    10
}

fn default_liveness_timeout_secs() -> u64 {
    60
}

fn default_retention_timeout_secs() -> u64 {
    300
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_control_timeout_secs() -> u64 {
    10
}

fn default_data_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_subscriber_queue_capacity() -> usize {
    1024
}

fn default_cors_allowed_origins() -> String {
    "http://localhost:3000,http://127.0.0.1:3000".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("LANSHARE"))
            .build()?;

        let settings: Config = config.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Invalid LANSHARE_* configuration ({}), using defaults", e);
            Config::default()
        });

        Ok(settings)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn retention_timeout(&self) -> Duration {
        Duration::from_secs(self.retention_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    /// Display name announced to peers
    pub fn resolved_device_name(&self) -> String {
        if let Some(name) = &self.device_name {
            return name.clone();
        }

        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();
        let host = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().to_string());

        match (user, host) {
            (Some(user), Some(host)) => format!("{}@{}", user, host),
            _ => "Unknown Device".to_string(),
        }
    }

    /// Address announced to peers, `host:port`
    pub fn resolved_advertise_address(&self) -> String {
        if let Some(addr) = &self.advertise_address {
            return addr.clone();
        }

        let ip = local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| "127.0.0.1".to_string());
        format!("{}:{}", ip, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            device_name: None,
            advertise_address: None,
            staging_dir: default_staging_dir(),
            inbox_dir: default_inbox_dir(),
            discovery_enabled: default_true(),
            sweep_interval_secs: default_sweep_interval_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            retention_timeout_secs: default_retention_timeout_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            control_timeout_secs: default_control_timeout_secs(),
            data_timeout_secs: default_data_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            cors_allowed_origins: default_cors_allowed_origins(),
        }
    }
}
