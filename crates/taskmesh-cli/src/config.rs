//! `taskmesh.toml` loading with environment overrides.
//!
//! Every section is optional; a missing file yields the defaults.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use taskmesh_broker::BrokerConfig;
use taskmesh_core::{TaskmeshError, TaskmeshResult};
use taskmesh_gateway::{AuthConfig, GatewayConfig};
use taskmesh_orchestrator::{AgentDefaults, AgentSpec, RuntimeConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskmeshConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub agents: AgentsConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = TaskmeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(TaskmeshError::Config(format!("Unknown log format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub max_concurrent_tasks: usize,
    pub task_timeout_ms: u64,
    pub message_ttl_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Workers registered at startup.
    pub bootstrap: Vec<AgentSpec>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: taskmesh_core::agent::DEFAULT_MAX_CONCURRENT_TASKS,
            task_timeout_ms: taskmesh_core::agent::DEFAULT_TIMEOUT_MS,
            message_ttl_secs: 60,
            shutdown_grace_secs: 10,
            bootstrap: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Accepted `x-api-key` values. Empty disables the check.
    pub api_keys: Vec<String>,
}

fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> TaskmeshResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| TaskmeshError::Config(format!("{name}={raw}: {e}")))
}

impl TaskmeshConfig {
    /// Read `path`, or return the defaults when it does not exist.
    pub fn load(path: &Path) -> TaskmeshResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| TaskmeshError::Config(format!("Invalid config file '{}': {e}", path.display())))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> TaskmeshResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> TaskmeshResult<()> {
        if let Some(v) = var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("PORT") {
            self.server.port = parse("PORT", &v)?;
        }
        if let Some(v) = var("CORS_ORIGIN") {
            self.server.cors_origin = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.logging.format = v.parse()?;
        }
        if let Some(v) = var("MAX_CONCURRENT_TASKS") {
            self.agents.max_concurrent_tasks = parse("MAX_CONCURRENT_TASKS", &v)?;
        }
        if let Some(v) = var("TASK_TIMEOUT") {
            self.agents.task_timeout_ms = parse("TASK_TIMEOUT", &v)?;
        }
        if let Some(v) = var("MESSAGE_TTL_SECS") {
            self.agents.message_ttl_secs = parse("MESSAGE_TTL_SECS", &v)?;
        }
        if let Some(v) = var("API_KEYS") {
            self.security.api_keys = v
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            broker: BrokerConfig {
                message_ttl: Duration::from_secs(self.agents.message_ttl_secs),
            },
            agent_defaults: AgentDefaults {
                max_concurrent_tasks: self.agents.max_concurrent_tasks,
                timeout_ms: self.agents.task_timeout_ms,
            },
            bootstrap: self.agents.bootstrap.clone(),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            cors_origin: self.server.cors_origin.clone(),
            auth: AuthConfig::new(self.security.api_keys.clone()),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.agents.shutdown_grace_secs)
    }
}
