//! # Federation Errors
//!
//! The failures a caller of the federation client can observe. Every variant is
//! scoped to a single remote; none of them poison other remotes or the host.
//!
//! Errors are `Clone` because one load attempt is shared by every caller that
//! joined it while it was in flight, and each of them receives the same failure.

use crate::environment;
use crate::fetch;
use crate::remote::RemoteId;

/// Why a remote could not be turned into a usable container.
#[derive(Debug, Clone)]
pub enum LoadCause {
    /// The entry artifact could not be fetched.
    Fetch(fetch::Error),
    /// The artifact was fetched but could not be executed or had the wrong shape.
    Execute(environment::Error),
    /// The artifact executed but registered nothing under the remote's name.
    SlotMissing,
    /// The raw container failed to initialize for a reason other than repeat init.
    Init(String),
    /// The raw container failed while resolving an export.
    Get(String),
    /// The load task died before settling.
    Aborted(String),
}

impl std::fmt::Display for LoadCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {}", e),
            Self::Execute(e) => write!(f, "execution failed: {}", e),
            Self::SlotMissing => write!(f, "no container registered under the remote's name"),
            Self::Init(msg) => write!(f, "init failed: {}", msg),
            Self::Get(msg) => write!(f, "get failed: {}", msg),
            Self::Aborted(msg) => write!(f, "load task aborted: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    UnknownRemote(RemoteId),
    RemoteLoad { id: RemoteId, cause: LoadCause },
    ExportNotFound { id: RemoteId, request: String },
    SharedDependencyMissing { id: RemoteId, name: String },
    Timeout { id: RemoteId, request: String },
}

impl Error {
    pub(crate) fn load(id: &RemoteId, cause: LoadCause) -> Self {
        Self::RemoteLoad {
            id: id.clone(),
            cause,
        }
    }

    /// The remote this failure belongs to.
    pub fn remote(&self) -> &RemoteId {
        match self {
            Self::UnknownRemote(id) => id,
            Self::RemoteLoad { id, .. } => id,
            Self::ExportNotFound { id, .. } => id,
            Self::SharedDependencyMissing { id, .. } => id,
            Self::Timeout { id, .. } => id,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRemote(id) => write!(f, "Unknown remote: {}", id),
            Self::RemoteLoad { id, cause } => write!(f, "Failed to load remote {}: {}", id, cause),
            Self::ExportNotFound { id, request } => {
                write!(f, "Remote {} does not expose '{}'", id, request)
            }
            Self::SharedDependencyMissing { id, name } => {
                write!(f, "Remote {} requires undeclared shared dependency '{}'", id, name)
            }
            Self::Timeout { id, request } => {
                write!(f, "Timed out requesting '{}' from remote {}", request, id)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RemoteLoad { cause: LoadCause::Fetch(e), .. } => Some(e),
            Self::RemoteLoad { cause: LoadCause::Execute(e), .. } => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
