use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::PushError;

/// Build the artifact file name for one device fragment
/// e.g., ("r1", "interfaces.cfg") -> "r1_interfaces.cfg"
pub fn artifact_file_name(hostname: &str, config_file: &str) -> String {
    format!("{}_{}", hostname, config_file)
}

/// ConfigArtifact is one rendered configuration fragment on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigArtifact {
    pub name: String,
    pub hostname: String,
    pub path: PathBuf,
}

/// ArtifactStore owns the rendered configuration files of a run and the
/// mapping from each device to its artifacts, in application order.
pub struct ArtifactStore {
    dir: PathBuf,
    extension: String,
    manifest: BTreeMap<String, Vec<ConfigArtifact>>,
    names: HashSet<String>,
}

impl ArtifactStore {
    /// Open (creating if needed) an empty store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, PushError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            manifest: BTreeMap::new(),
            names: HashSet::new(),
        })
    }

    /// Rebuild the manifest from artifacts already on disk.
    ///
    /// Files are taken in name order. Each file goes to the device with the
    /// longest hostname `h` such that the file name starts with `"{h}_"`, so
    /// `r10_base.cfg` never lands on `r1`.
    pub fn scan<'a>(
        dir: impl Into<PathBuf>,
        extension: &str,
        hostnames: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, PushError> {
        let mut store = Self::new(dir, extension)?;
        let hostnames: Vec<&str> = hostnames.into_iter().collect();

        for name in store.list()? {
            let owner = hostnames
                .iter()
                .filter(|h| name.starts_with(&format!("{}_", h)))
                .max_by_key(|h| h.len());

            match owner {
                Some(hostname) => {
                    let artifact = ConfigArtifact {
                        path: store.dir.join(&name),
                        name: name.clone(),
                        hostname: hostname.to_string(),
                    };
                    store.register(artifact)?;
                }
                None => tracing::debug!("Ignoring artifact '{}' with no matching device", name),
            }
        }

        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one rendered fragment and record it for its device
    pub fn write(
        &mut self,
        hostname: &str,
        config_file: &str,
        text: &str,
    ) -> Result<ConfigArtifact, PushError> {
        let name = artifact_file_name(hostname, config_file);
        if self.names.contains(&name) {
            return Err(PushError::Artifact {
                name,
                reason: "already written in this run".to_string(),
            });
        }

        let path = self.dir.join(&name);
        std::fs::write(&path, text).map_err(|e| PushError::Artifact {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let artifact = ConfigArtifact {
            name,
            hostname: hostname.to_string(),
            path,
        };
        self.register(artifact.clone())?;
        Ok(artifact)
    }

    fn register(&mut self, artifact: ConfigArtifact) -> Result<(), PushError> {
        if !self.names.insert(artifact.name.clone()) {
            return Err(PushError::Artifact {
                name: artifact.name,
                reason: "duplicate artifact name".to_string(),
            });
        }
        self.manifest
            .entry(artifact.hostname.clone())
            .or_default()
            .push(artifact);
        Ok(())
    }

    /// Artifacts belonging to exactly this hostname, in application order
    pub fn select_for(&self, hostname: &str) -> &[ConfigArtifact] {
        self.manifest.get(hostname).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Read an artifact's text for sending
    pub fn read(&self, artifact: &ConfigArtifact) -> Result<String, PushError> {
        std::fs::read_to_string(&artifact.path).map_err(|e| PushError::Artifact {
            name: artifact.name.clone(),
            reason: e.to_string(),
        })
    }

    /// File names in the store directory carrying the artifact extension, sorted
    pub fn list(&self) -> Result<Vec<String>, PushError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e == self.extension);
            if !matches_ext {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
