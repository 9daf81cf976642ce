use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Lifecycle states a device passes through during its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum DeviceState {
    Idle,
    Connecting,
    Connected,
    /// Zero-based position of the artifact being applied
    ApplyingArtifact(usize),
    /// Applying stopped early: a rejected command or a failed transport
    Aborted,
    AllApplied,
    Saved,
    NotSaved,
    Disconnected,
    Terminal,
}

/// Final result of one device's turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeviceOutcome {
    /// Every artifact applied and the running configuration was persisted
    Saved,
    /// The device rejected a command; later artifacts were skipped
    Aborted {
        artifact: String,
        marker: String,
        line: String,
    },
    /// The management channel failed while sending an artifact
    TransportFailed { artifact: String, error: String },
    /// Every artifact applied but persisting the configuration failed
    SaveFailed { error: String },
    /// No session could be opened
    ConnectFailed { error: String },
    /// An artifact could not be read, so the device was never contacted
    ArtifactFailed { artifact: String, error: String },
}

impl DeviceOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// DeviceReport records timing and outcome for one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub hostname: String,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub artifacts_sent: usize,
    pub outcome: DeviceOutcome,
    pub trail: Vec<DeviceState>,
}

/// RunMetrics aggregates the per-device reports of one fleet run
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_elapsed: Duration,
    pub devices: Vec<DeviceReport>,
    /// Hostname whose connect failure stopped the run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<String>,
}

impl RunMetrics {
    #[cfg(test)]
    pub fn device(&self, hostname: &str) -> Option<&DeviceReport> {
        self.devices.iter().find(|d| d.hostname == hostname)
    }

    pub fn saved_count(&self) -> usize {
        self.devices.iter().filter(|d| d.outcome.is_saved()).count()
    }

    pub fn all_saved(&self) -> bool {
        self.halted_at.is_none() && self.devices.iter().all(|d| d.outcome.is_saved())
    }

    pub fn sum_device_elapsed(&self) -> Duration {
        self.devices.iter().map(|d| d.elapsed).sum()
    }
}
