//! # Remote Identity
//!
//! Strong types for naming a remote and describing where its entry artifact lives.

use std::sync::Arc;

/// Sub-path every remote publishes its entry artifact under, unless configured otherwise.
pub const DEFAULT_ENTRY_PATH: &str = "/moduleEntry.wasm";

/// Logical name of a remote.
///
/// The same name is used as the slot an entry artifact registers its container under.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemoteId(Arc<str>);

impl RemoteId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RemoteId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&RemoteId> for RemoteId {
    fn from(id: &RemoteId) -> Self {
        id.clone()
    }
}

/// Where to find a remote's entry artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub id: RemoteId,
    pub base_url: String,
    pub entry_path: String,
}

impl RemoteDescriptor {
    pub fn new(id: impl Into<RemoteId>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            entry_path: DEFAULT_ENTRY_PATH.to_string(),
        }
    }

    pub fn with_entry_path(mut self, entry_path: impl Into<String>) -> Self {
        self.entry_path = entry_path.into();
        self
    }

    /// `base_url + entry_path`, collapsing a doubled slash at the seam.
    pub fn entry_url(&self) -> String {
        let base = self.base_url.as_str();
        let path = self.entry_path.as_str();
        if base.ends_with('/') && path.starts_with('/') {
            format!("{}{}", base, &path[1..])
        } else {
            format!("{}{}", base, path)
        }
    }
}

/// Progress of a remote through the loader.
///
/// `Failed -> Loading` only happens when a caller issues a new request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    NotRequested,
    Loading,
    Loaded,
    Failed,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRequested => write!(f, "not-requested"),
            Self::Loading => write!(f, "loading"),
            Self::Loaded => write!(f, "loaded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
