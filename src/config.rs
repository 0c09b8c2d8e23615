use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use toolpilot::gateway::DEFAULT_TOOL_TIMEOUT;
use toolpilot::ipc::default_socket_path;
use toolpilot::planner::{AnthropicConfig, DEFAULT_SYSTEM_PROMPT};
use toolpilot::runner::{DEFAULT_PLANNER_TIMEOUT, DispatchMode, LoopRunnerConfig};

/// Overrides the configured socket path
pub const SOCKET_ENV: &str = "TOOLPILOT_SOCKET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub gateway: GatewayConfig,
    pub planner: PlannerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub socket_path: Option<PathBuf>,
    /// Environment variable holding the shared secret
    pub credential_env: String,
    pub default_timeout_ms: u64,
    pub max_clients: usize,
    /// TOML catalog; the stock tools are served when unset
    pub catalog_path: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            credential_env: "TOOLPILOT_API_KEY".to_string(),
            default_timeout_ms: DEFAULT_TOOL_TIMEOUT.as_millis() as u64,
            max_clients: 16,
            catalog_path: None,
            workdir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub system_prompt: Option<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let anthropic = AnthropicConfig::default();
        Self {
            model: anthropic.model,
            max_tokens: anthropic.max_tokens,
            timeout_ms: DEFAULT_PLANNER_TIMEOUT.as_millis() as u64,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_iterations: u32,
    pub dispatch: DispatchMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            dispatch: DispatchMode::Sequential,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            gateway: GatewayConfig::default(),
            planner: PlannerConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.default_timeout_ms == 0 {
            bail!("gateway.default_timeout_ms must be greater than zero");
        }
        if self.gateway.max_clients == 0 {
            bail!("gateway.max_clients must be greater than zero");
        }
        if self.gateway.credential_env.trim().is_empty() {
            bail!("gateway.credential_env must name an environment variable");
        }
        if self.planner.timeout_ms == 0 {
            bail!("planner.timeout_ms must be greater than zero");
        }
        if self.planner.max_tokens == 0 {
            bail!("planner.max_tokens must be greater than zero");
        }
        Ok(())
    }

    /// Socket path: `TOOLPILOT_SOCKET`, then config, then the runtime default
    pub fn socket_path(&self) -> PathBuf {
        std::env::var_os(SOCKET_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.gateway.socket_path.clone())
            .unwrap_or_else(default_socket_path)
    }

    /// Shared gateway secret from the configured environment variable
    pub fn credential_secret(&self) -> Result<String> {
        match std::env::var(&self.gateway.credential_env) {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            _ => bail!(
                "Gateway credential not found: set {} to the shared secret",
                self.gateway.credential_env
            ),
        }
    }

    pub fn workdir(&self) -> Result<PathBuf> {
        match &self.gateway.workdir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to resolve working directory"),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.default_timeout_ms)
    }

    pub fn runner_config(&self) -> LoopRunnerConfig {
        LoopRunnerConfig::default()
            .with_planner_timeout(Duration::from_millis(self.planner.timeout_ms))
            .with_dispatch(self.session.dispatch)
            .with_system_prompt(
                self.planner
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            )
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            model: self.planner.model.clone(),
            max_tokens: self.planner.max_tokens,
            ..AnthropicConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.gateway.credential_env, "TOOLPILOT_API_KEY");
        assert_eq!(config.gateway.default_timeout_ms, 30000);
        assert_eq!(config.gateway.max_clients, 16);
        assert_eq!(config.session.max_iterations, 10);
        assert_eq!(config.session.dispatch, DispatchMode::Sequential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "session:\n  max_iterations: 3\n  dispatch: concurrent\nplanner:\n  model: claude-3-haiku-20240307\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.session.max_iterations, 3);
        assert_eq!(config.session.dispatch, DispatchMode::Concurrent);
        assert_eq!(config.planner.model, "claude-3-haiku-20240307");
        assert_eq!(config.planner.max_tokens, 8192);
        assert_eq!(config.gateway.max_clients, 16);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.gateway.default_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.max_clients = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.planner.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("toolpilot.yml");
        fs::write(&path, "log_level: debug\ngateway:\n  max_clients: 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.gateway.max_clients, 2);
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "gateway:\n  max_clients: 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_runner_config() {
        let mut config = Config::default();
        config.planner.timeout_ms = 5000;
        config.planner.system_prompt = Some("be brief".into());
        let runner = config.runner_config();
        assert_eq!(runner.planner_timeout, Duration::from_millis(5000));
        assert_eq!(runner.system_prompt, "be brief");
    }

    #[test]
    fn test_configured_socket_path() {
        let mut config = Config::default();
        config.gateway.socket_path = Some(PathBuf::from("/tmp/custom.sock"));
        if std::env::var_os(SOCKET_ENV).is_none() {
            assert_eq!(config.socket_path(), PathBuf::from("/tmp/custom.sock"));
        }
    }
}
