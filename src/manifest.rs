//! Package manifest (`package.json`) access.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::TaskError;

/// The subset of package.json the pipeline needs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    /// Runtime libraries the bundle expects the page to provide, in
    /// manifest order
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: IndexMap<String, String>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self, TaskError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|source| TaskError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
