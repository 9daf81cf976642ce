mod metrics;

pub use metrics::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::PushError;

/// Canonical device_type values understood by the SSH session
pub mod device_type {
    pub const CISCO_IOS: &str = "cisco_ios";
    pub const CISCO_XE: &str = "cisco_xe";
    pub const CISCO_NXOS: &str = "cisco_nxos";
    pub const ARISTA_EOS: &str = "arista_eos";
}

fn default_ssh_port() -> u16 {
    22
}

fn default_device_type() -> String {
    device_type::CISCO_IOS.to_string()
}

/// Connection holds the management parameters for a single device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
}

/// ConfigSpec names one rendered fragment of a device's configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSpec {
    pub template: String,
    pub data_path: String,
    pub config_file: String,
}

/// Device is one entry of the infrastructure model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub hostname: String,
    pub connection: Connection,
    #[serde(default)]
    pub config_spec: Vec<ConfigSpec>,
    /// Named data fields referenced by `ConfigSpec::data_path`
    #[serde(flatten)]
    pub data: BTreeMap<String, serde_yaml::Value>,
}

impl Device {
    /// Build the template binding `{data_path: <field value>}` for one spec
    pub fn binding(&self, spec: &ConfigSpec) -> Result<serde_json::Value, PushError> {
        let value = self.data.get(&spec.data_path).ok_or_else(|| {
            PushError::model(format!(
                "device '{}' has no data field '{}' (template '{}')",
                self.hostname, spec.data_path, spec.template
            ))
        })?;

        // YAML allows non-string map keys (e.g. VLAN ids); JSON objects stringify them
        let value = serde_json::to_value(value).map_err(|e| {
            PushError::model(format!(
                "device '{}' data field '{}' cannot be bound: {}",
                self.hostname, spec.data_path, e
            ))
        })?;

        let mut binding = serde_json::Map::new();
        binding.insert(spec.data_path.clone(), value);
        Ok(serde_json::Value::Object(binding))
    }
}

#[derive(Debug, Deserialize)]
struct ModelDocument {
    #[serde(alias = "model")]
    modelo: ModelRoot,
}

#[derive(Debug, Deserialize)]
struct ModelRoot {
    infra_spec: InfraSpec,
}

#[derive(Debug, Deserialize)]
struct InfraSpec {
    devices: Vec<Device>,
}

/// InfraModel is the loaded, validated fleet description
#[derive(Debug, Clone, Serialize)]
pub struct InfraModel {
    pub devices: Vec<Device>,
}

impl InfraModel {
    /// Load and validate the model from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PushError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PushError::model(format!("cannot read model file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate the model from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, PushError> {
        let doc: ModelDocument =
            serde_yaml::from_str(content).map_err(|e| PushError::model(e.to_string()))?;
        let model = Self {
            devices: doc.modelo.infra_spec.devices,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check every invariant the pipeline relies on before anything is rendered
    fn validate(&self) -> Result<(), PushError> {
        let mut hostnames = HashSet::new();

        for device in &self.devices {
            if !crate::utils::is_valid_hostname(&device.hostname) {
                return Err(PushError::model(format!("invalid hostname '{}'", device.hostname)));
            }
            if !hostnames.insert(device.hostname.as_str()) {
                return Err(PushError::model(format!("duplicate hostname '{}'", device.hostname)));
            }
            if device.connection.host.trim().is_empty() {
                return Err(PushError::model(format!(
                    "device '{}' has an empty connection host",
                    device.hostname
                )));
            }

            let mut files = HashSet::new();
            for spec in &device.config_spec {
                if spec.config_file.is_empty()
                    || spec.config_file.contains(['/', '\\'])
                    || spec.config_file.starts_with('.')
                {
                    return Err(PushError::model(format!(
                        "device '{}' has invalid config_file '{}'",
                        device.hostname, spec.config_file
                    )));
                }
                if !files.insert(spec.config_file.as_str()) {
                    return Err(PushError::model(format!(
                        "device '{}' lists config_file '{}' twice",
                        device.hostname, spec.config_file
                    )));
                }
                device.binding(spec)?;
            }
        }

        Ok(())
    }

    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.hostname.as_str())
    }
}
