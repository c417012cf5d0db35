//! The asset manifest: resource paths, their content hashes, and the core
//! shell that must be staged before the application can start.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Path → content-hash mapping as persisted in the manifest record.
pub type ResourceHashes = BTreeMap<String, String>;

/// Immutable manifest for one deployed version of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawManifest", into = "RawManifest")]
pub struct Manifest {
    resources: ResourceHashes,
    core: Vec<String>,
}

/// On-disk shape of a manifest file produced by the build step.
#[derive(Serialize, Deserialize)]
struct RawManifest {
    resources: ResourceHashes,
    #[serde(default)]
    core: Vec<String>,
}

impl TryFrom<RawManifest> for Manifest {
    type Error = Error;

    fn try_from(raw: RawManifest) -> Result<Self> {
        Self::new(raw.resources, raw.core)
    }
}

impl From<Manifest> for RawManifest {
    fn from(manifest: Manifest) -> Self {
        Self {
            resources: manifest.resources,
            core: manifest.core,
        }
    }
}

impl Manifest {
    /// Creates a manifest, checking that every core path is a resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Manifest`] if a core path is missing from
    /// `resources` or listed twice.
    pub fn new(resources: ResourceHashes, core: Vec<String>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for path in &core {
            if !resources.contains_key(path) {
                return Err(Error::Manifest(format!(
                    "core path '{path}' is not a manifest resource"
                )));
            }
            if !seen.insert(path.as_str()) {
                return Err(Error::Manifest(format!("core path '{path}' listed twice")));
            }
        }
        Ok(Self { resources, core })
    }

    /// Parses a manifest from its JSON document form.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the manifest is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// Loads a manifest file written by the build step.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Returns the content hash recorded for `path`.
    #[must_use]
    pub fn hash(&self, path: &str) -> Option<&str> {
        self.resources.get(path).map(String::as_str)
    }

    /// Returns true if `path` is a manifest resource.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.resources.contains_key(path)
    }

    /// Iterates resource paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Returns the core shell paths in staging order.
    #[must_use]
    pub fn core(&self) -> &[String] {
        &self.core
    }

    /// Returns the full path → hash mapping.
    #[must_use]
    pub const fn resources(&self) -> &ResourceHashes {
        &self.resources
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the manifest lists no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// True if a cached copy of `path` from a version described by `record`
    /// is still valid for this manifest.
    #[must_use]
    pub fn is_unchanged(&self, path: &str, record: &ResourceHashes) -> bool {
        match (self.hash(path), record.get(path)) {
            (Some(current), Some(previous)) => current == previous,
            _ => false,
        }
    }

    /// Serializes the path → hash mapping as stored in the manifest record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_record_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.resources)?)
    }
}

/// Parses the body of a persisted manifest record.
///
/// # Errors
///
/// Returns [`Error::ManifestRecord`] if the body is not a JSON object of
/// string hashes.
pub fn parse_record(body: &[u8]) -> Result<ResourceHashes> {
    serde_json::from_slice(body).map_err(Error::ManifestRecord)
}
