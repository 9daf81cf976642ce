use thiserror::Error;

/// Errors raised while loading, rendering or pushing device configuration.
///
/// Model, render and artifact errors are fatal to a run. Connect, transport and
/// save errors are contained to the device whose turn produced them.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid infrastructure model: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load templates from {dir}: {reason}")]
    Templates { dir: String, reason: String },

    #[error("failed to render template '{template}' for {hostname}: {reason}")]
    Render {
        hostname: String,
        template: String,
        reason: String,
    },

    #[error("artifact {name}: {reason}")]
    Artifact { name: String, reason: String },

    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("transport failure on {host}: {reason}")]
    Transport { host: String, reason: String },

    #[error("failed to save configuration on {host}: {reason}")]
    Save { host: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PushError {
    pub fn model(reason: impl Into<String>) -> Self {
        Self::Model(reason.into())
    }

    pub fn connect(host: &str, reason: impl std::fmt::Display) -> Self {
        Self::Connect {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(host: &str, reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn save(host: &str, reason: impl std::fmt::Display) -> Self {
        Self::Save {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }
}
