use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action::ACTION_STALE_DAYS;
use crate::domain::conversation::CONVERSATION_TTL_DAYS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub sweep: SweepConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Upper bound on model/tool round-trips within one customer turn.
    pub max_tool_rounds: u32,
    pub conversation_ttl_days: i64,
    pub action_stale_days: i64,
}

#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Bearer credential the sweep endpoint requires.
    pub shared_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub sweep_shared_secret: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://venuely.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: None,
                model: "claude-sonnet-4-20250514".to_string(),
                max_tokens: 1_024,
                timeout_secs: 60,
                max_retries: 1,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            agent: AgentConfig {
                max_tool_rounds: 6,
                conversation_ttl_days: CONVERSATION_TTL_DAYS,
                action_stale_days: ACTION_STALE_DAYS,
            },
            sweep: SweepConfig { shared_secret: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    agent: Option<AgentPatch>,
    sweep: Option<SweepPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_tool_rounds: Option<u32>,
    conversation_ttl_days: Option<i64>,
    action_stale_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct SweepPatch {
    shared_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("venuely.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_tool_rounds) = agent.max_tool_rounds {
                self.agent.max_tool_rounds = max_tool_rounds;
            }
            if let Some(conversation_ttl_days) = agent.conversation_ttl_days {
                self.agent.conversation_ttl_days = conversation_ttl_days;
            }
            if let Some(action_stale_days) = agent.action_stale_days {
                self.agent.action_stale_days = action_stale_days;
            }
        }

        if let Some(sweep) = patch.sweep {
            if let Some(shared_secret) = sweep.shared_secret {
                self.sweep.shared_secret = Some(secret_value(shared_secret));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VENUELY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("VENUELY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("VENUELY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("VENUELY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("VENUELY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VENUELY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VENUELY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("VENUELY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("VENUELY_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("VENUELY_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("VENUELY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("VENUELY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VENUELY_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("VENUELY_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("VENUELY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VENUELY_SERVER_PORT") {
            self.server.port = parse_u16("VENUELY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VENUELY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("VENUELY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("VENUELY_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_u32("VENUELY_AGENT_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("VENUELY_AGENT_CONVERSATION_TTL_DAYS") {
            self.agent.conversation_ttl_days =
                parse_i64("VENUELY_AGENT_CONVERSATION_TTL_DAYS", &value)?;
        }
        if let Some(value) = read_env("VENUELY_AGENT_ACTION_STALE_DAYS") {
            self.agent.action_stale_days = parse_i64("VENUELY_AGENT_ACTION_STALE_DAYS", &value)?;
        }

        if let Some(value) = read_env("VENUELY_SWEEP_SHARED_SECRET") {
            self.sweep.shared_secret = Some(secret_value(value));
        }

        let log_level = read_env("VENUELY_LOGGING_LEVEL").or_else(|| read_env("VENUELY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VENUELY_LOGGING_FORMAT").or_else(|| read_env("VENUELY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(shared_secret) = overrides.sweep_shared_secret {
            self.sweep.shared_secret = Some(secret_value(shared_secret));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Validation(
                "agent.max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.agent.conversation_ttl_days <= 0 {
            return Err(ConfigError::Validation(
                "agent.conversation_ttl_days must be positive".to_string(),
            ));
        }
        if self.agent.action_stale_days <= 0 {
            return Err(ConfigError::Validation(
                "agent.action_stale_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(value) = read_env("VENUELY_CONFIG") {
        return Some(PathBuf::from(value));
    }
    let default = PathBuf::from("venuely.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}
