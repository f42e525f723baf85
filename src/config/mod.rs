// Configuration module

use std::time::Duration;

use serde::Deserialize;

use crate::batch::RegistryLimits;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Comma-separated list of allowed CORS origins
    pub frontend_url: String,
    pub environment: Environment,
    pub log_format: LogFormat,
    pub max_body_bytes: usize,
    pub max_tasks: usize,
    pub task_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, ::config::ConfigError> {
        let config = ::config::Config::builder()
            .add_source(::config::Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            max_tasks: self.max_tasks.max(1),
            task_ttl: Duration::from_secs(self.task_ttl_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Parsed CORS origins; entries that are not valid header values are skipped
    pub fn cors_origins(&self) -> Vec<axum::http::HeaderValue> {
        self.frontend_url
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 5001,
            frontend_url: "http://localhost:3000".to_string(),
            environment: Environment::Development,
            log_format: LogFormat::Pretty,
            max_body_bytes: 64 * 1024 * 1024,
            max_tasks: 1024,
            task_ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}
