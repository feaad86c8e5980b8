//! # Configuration
//!
//! The one runtime-configurable surface: which remotes exist and where they live.
//! Loaded from JSON, optionally overridden per remote from the environment, then
//! applied to a [`RemoteRegistry`] before the first request.
//!
//! ```json
//! { "remotes": [ { "id": "RemoteModuleFoo", "base_url": "http://localhost:8001" } ] }
//! ```

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::registry::RemoteRegistry;
use crate::registry::Update;
use crate::remote::DEFAULT_ENTRY_PATH;
use crate::remote::RemoteDescriptor;

/// Prefix of the environment variables that override a remote's base URL.
pub const ENV_PREFIX: &str = "FEDRUN_URL_";

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read config: {}", e),
            Self::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn default_entry_path() -> String {
    DEFAULT_ENTRY_PATH.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default = "default_entry_path")]
    pub entry_path: String,
}

impl RemoteConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            entry_path: default_entry_path(),
        }
    }

    pub fn descriptor(&self) -> RemoteDescriptor {
        RemoteDescriptor::new(self.id.as_str(), self.base_url.clone())
            .with_entry_path(self.entry_path.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConfig {
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

impl FederationConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.remotes.push(remote);
        self
    }

    /// Name of the variable overriding `id`'s base URL, e.g. `FEDRUN_URL_REMOTEMODULEFOO`.
    pub fn env_key(id: &str) -> String {
        let suffix: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", ENV_PREFIX, suffix)
    }

    /// Replaces base URLs for which `lookup` returns a value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for remote in &mut self.remotes {
            if let Some(url) = lookup(&Self::env_key(&remote.id)) {
                info!(remote = %remote.id, %url, "base URL overridden from environment");
                remote.base_url = url;
            }
        }
        self
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Registers every remote. Returns the ids whose change was ignored because
    /// they had already started loading.
    pub fn apply(&self, registry: &RemoteRegistry) -> Vec<String> {
        self.remotes
            .iter()
            .filter(|remote| registry.register(remote.descriptor()) == Update::IgnoredFrozen)
            .map(|remote| remote.id.clone())
            .collect()
    }
}
