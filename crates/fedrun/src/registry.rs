//! # Remote Registry
//!
//! Maps a remote's logical name to where its entry artifact lives. Pure lookup, no
//! network access.
//!
//! A remote's base URL may change freely until its first load begins. From then on
//! the descriptor is frozen: later changes are ignored with a warning and never
//! affect an in-flight or completed load.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::remote::RemoteDescriptor;
use crate::remote::RemoteId;

/// Outcome of a configuration change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Update {
    Applied,
    /// The remote has started loading; its location is fixed.
    IgnoredFrozen,
}

struct Registered {
    descriptor: RemoteDescriptor,
    frozen: bool,
}

/// Cloning a `RemoteRegistry` yields another handle to the same table.
#[derive(Clone, Default)]
pub struct RemoteRegistry {
    remotes: Arc<DashMap<RemoteId, Registered>>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a remote under the default entry path.
    pub fn configure(&self, id: impl Into<RemoteId>, base_url: impl Into<String>) -> Update {
        self.register(RemoteDescriptor::new(id, base_url))
    }

    pub fn configure_with_entry(
        &self,
        id: impl Into<RemoteId>,
        base_url: impl Into<String>,
        entry_path: impl Into<String>,
    ) -> Update {
        self.register(RemoteDescriptor::new(id, base_url).with_entry_path(entry_path))
    }

    /// Adds or replaces a descriptor, unless the remote is frozen.
    pub fn register(&self, descriptor: RemoteDescriptor) -> Update {
        match self.remotes.entry(descriptor.id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().frozen {
                    warn!(remote = %descriptor.id, "remote already loading, configuration ignored");
                    return Update::IgnoredFrozen;
                }
                debug!(remote = %descriptor.id, url = %descriptor.base_url, "remote reconfigured");
                entry.get_mut().descriptor = descriptor;
                Update::Applied
            }
            Entry::Vacant(entry) => {
                debug!(remote = %descriptor.id, url = %descriptor.base_url, "remote configured");
                entry.insert(Registered {
                    descriptor,
                    frozen: false,
                });
                Update::Applied
            }
        }
    }

    /// Points a configured remote at a new base URL.
    pub fn set_base_url(&self, id: &RemoteId, url: impl Into<String>) -> Result<Update> {
        let mut entry = self
            .remotes
            .get_mut(id)
            .ok_or_else(|| Error::UnknownRemote(id.clone()))?;

        if entry.frozen {
            warn!(remote = %id, "base URL change after load started is ignored");
            return Ok(Update::IgnoredFrozen);
        }
        entry.descriptor.base_url = url.into();
        Ok(Update::Applied)
    }

    pub fn resolve(&self, id: &RemoteId) -> Result<RemoteDescriptor> {
        self.remotes
            .get(id)
            .map(|entry| entry.descriptor.clone())
            .ok_or_else(|| Error::UnknownRemote(id.clone()))
    }

    /// Resolves and freezes the descriptor; called when a load is about to begin.
    pub(crate) fn freeze(&self, id: &RemoteId) -> Result<RemoteDescriptor> {
        let mut entry = self
            .remotes
            .get_mut(id)
            .ok_or_else(|| Error::UnknownRemote(id.clone()))?;
        entry.frozen = true;
        Ok(entry.descriptor.clone())
    }

    pub fn is_frozen(&self, id: &RemoteId) -> bool {
        self.remotes.get(id).map(|entry| entry.frozen).unwrap_or(false)
    }

    /// Configured remote ids, sorted.
    pub fn ids(&self) -> Vec<RemoteId> {
        let mut ids: Vec<RemoteId> = self.remotes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
