//! # Configuration Management
//!
//! Loads the service configuration from several sources:
//! - Default values (built into the code)
//! - An optional `config` file (`config.toml`, `config.yaml`, ...)
//! - Environment variables with the `APP_` prefix
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms set these)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_TRANSCRIBER__COMMAND`, ...)
//! 3. Configuration file
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated with a double underscore so that field names with
//! underscores survive: `APP_STORAGE__TEMP_DIR` maps to `storage.temp_dir`.

use crate::limiter::{MAX_CAPACITY, MIN_CAPACITY};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcriber: TranscriberConfig,
    pub limiter: LimiterConfig,
    pub upload: UploadConfig,
}

/// Where and how the HTTP server listens.
///
/// `request_timeout_secs` bounds how long a client may take to send a request
/// and how long idle keep-alive connections are held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

/// Temp directory for uploads and transcriber output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub temp_dir: String,
}

/// External transcriber invocation.
///
/// ## Fields:
/// - `command`: command template, e.g.
///   `transcribe --in {{INPUT}} --out {{OUTPUT}} --instrument {{INSTRUMENT}}`
/// - `timeout_secs`: hard limit for a single run; the process is killed after it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    pub command: String,
    pub timeout_secs: u64,
}

/// Admission control for concurrent transcriptions.
///
/// ## Fields:
/// - `max_concurrent`: slot pool size, must be in [1, 100]
/// - `wait_timeout_ms`: how long a request waits for a free slot before it is
///   rejected as busy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub max_concurrent: usize,
    pub wait_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                request_timeout_secs: 120,
            },
            storage: StorageConfig {
                temp_dir: "/tmp/music-transcription".to_string(),
            },
            transcriber: TranscriberConfig {
                command: String::new(),  // must be configured
                timeout_secs: 120,
            },
            limiter: LimiterConfig {
                max_concurrent: 10,
                wait_timeout_ms: 2000,
            },
            upload: UploadConfig {
                max_file_bytes: 50 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the optional config file and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_TRANSCRIBER__COMMAND="transcribe {{INPUT}} {{OUTPUT}}"`
    /// - `APP_LIMITER__MAX_CONCURRENT=4`
    /// - `APP_STORAGE__TEMP_DIR=/var/tmp/mts`
    /// - `PORT=3000`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject settings the service can't start with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("Server port cannot be 0");
        }

        if self.storage.temp_dir.trim().is_empty() {
            bail!("Temp dir must be set");
        }

        if self.transcriber.command.trim().is_empty() {
            bail!("Transcriber command must be set");
        }

        if self.transcriber.timeout_secs == 0 {
            bail!("Transcriber timeout must be greater than 0");
        }

        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&self.limiter.max_concurrent) {
            bail!(
                "Max concurrent transcriptions must be in [{}, {}], got {}",
                MIN_CAPACITY,
                MAX_CAPACITY,
                self.limiter.max_concurrent
            );
        }

        if self.upload.max_file_bytes == 0 {
            bail!("Max upload size must be greater than 0");
        }

        Ok(())
    }

    pub fn transcriber_timeout(&self) -> Duration {
        Duration::from_secs(self.transcriber.timeout_secs)
    }

    pub fn limiter_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.limiter.wait_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.transcriber.command = "transcribe {{INPUT}} {{OUTPUT}}".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.limiter.max_concurrent, 10);
        assert_eq!(config.limiter_wait_timeout(), Duration::from_secs(2));
        assert_eq!(config.transcriber_timeout(), Duration::from_secs(120));
        // The command has no sensible default
        assert!(config.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.limiter.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.limiter.max_concurrent = 101;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.transcriber.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.storage.temp_dir = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_round_trip_through_config_crate() {
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&valid_config()).unwrap())
            .build()
            .unwrap();
        let loaded: AppConfig = built.try_deserialize().unwrap();
        assert_eq!(loaded.transcriber.command, "transcribe {{INPUT}} {{OUTPUT}}");
        assert_eq!(loaded.upload.max_file_bytes, 50 * 1024 * 1024);
    }
}
