use std::env;
use std::time::Duration;

/// What happens to the rest of the fleet when a device cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailurePolicy {
    /// Record the failure and move on to the next device
    Skip,
    /// Record the failure and stop the fleet loop
    Abort,
}

impl ConnectFailurePolicy {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "abort" | "stop" => Self::Abort,
            "skip" | "continue" => Self::Skip,
            other => {
                tracing::warn!("Unknown ON_CONNECT_ERROR '{}', falling back to skip", other);
                Self::Skip
            }
        }
    }
}

/// Which phases of the pipeline a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Render artifacts, then push them
    Full,
    /// Render artifacts only
    Render,
    /// Push artifacts already present in the configs directory
    Push,
}

impl RunMode {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "render" => Self::Render,
            "push" => Self::Push,
            "full" | "" => Self::Full,
            other => {
                tracing::warn!("Unknown RUN_MODE '{}', falling back to full", other);
                Self::Full
            }
        }
    }

    pub fn renders(self) -> bool {
        matches!(self, Self::Full | Self::Render)
    }

    pub fn pushes(self) -> bool {
        matches!(self, Self::Full | Self::Push)
    }
}

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub model_path: String,
    pub templates_dir: String,
    pub configs_dir: String,
    pub artifact_extension: String,
    pub ssh_timeout_secs: u64,
    pub command_idle_ms: u64,
    pub on_connect_error: ConnectFailurePolicy,
    pub error_patterns_file: Option<String>,
    pub run_mode: RunMode,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            model_path: get_env("MODEL_PATH", "modelo_datos.yaml"),
            templates_dir: get_env("TEMPLATES_DIR", "templates"),
            configs_dir: get_env("CONFIGS_DIR", "configs"),
            artifact_extension: get_env("ARTIFACT_EXTENSION", "cfg")
                .trim_start_matches('.')
                .to_string(),
            ssh_timeout_secs: get_env("SSH_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            command_idle_ms: get_env("COMMAND_IDLE_MS", "500").parse().unwrap_or(500),
            on_connect_error: ConnectFailurePolicy::parse(&get_env("ON_CONNECT_ERROR", "skip")),
            error_patterns_file: env::var("ERROR_PATTERNS_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            run_mode: RunMode::parse(&get_env("RUN_MODE", "full")),
        }
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }

    pub fn command_idle(&self) -> Duration {
        Duration::from_millis(self.command_idle_ms)
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
