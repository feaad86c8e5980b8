//! # Execution Environment
//!
//! Executing an entry artifact must leave a container behind under a well-known
//! name. Instead of an ambient global namespace, artifacts register into an explicit
//! [`SlotTable`] owned by the loader.
//!
//! The artifact decides which slot it fills. The loader then looks for the slot
//! named after the remote it asked for, so a bundle that registers under the wrong
//! name is detected rather than silently accepted.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use tracing::warn;

use crate::container::Container;
use crate::container::ContainerProxy;
use crate::remote::RemoteId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The bytes are not an artifact this environment understands.
    Malformed(String),
    /// The artifact names an entry this environment does not provide.
    UnknownEntry(String),
    /// The artifact's container does not satisfy the `get`/`init` shape.
    Shape(String),
    /// Compiling or running the artifact failed.
    Runtime(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed artifact: {}", msg),
            Self::UnknownEntry(name) => write!(f, "Unknown entry: {}", name),
            Self::Shape(msg) => write!(f, "Container shape mismatch: {}", msg),
            Self::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A fetched entry artifact.
#[derive(Clone, Debug)]
pub struct Artifact {
    pub url: String,
    pub bytes: Vec<u8>,
}

/// Registry of containers keyed by the name their artifact registered them under.
///
/// Each raw container is wrapped in a [`ContainerProxy`] on registration, so every
/// caller that finds the slot shares one proxy and one init state.
#[derive(Clone, Default)]
pub struct SlotTable {
    slots: Arc<DashMap<String, Arc<ContainerProxy>>>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container. The first registration for a name wins.
    ///
    /// Returns `false` when the slot was already filled.
    pub fn register(&self, name: &str, container: Arc<dyn Container>) -> bool {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(_) => {
                warn!(slot = name, "slot already registered, keeping existing container");
                false
            }
            Entry::Vacant(slot) => {
                debug!(slot = name, "container registered");
                slot.insert(Arc::new(ContainerProxy::new(RemoteId::from(name), container)));
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ContainerProxy>> {
        self.slots.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}

/// Turns artifact bytes into registered containers.
#[async_trait::async_trait]
pub trait Environment: Send + Sync + 'static {
    /// Executes the artifact, registering whatever containers it defines.
    async fn execute(&self, artifact: &Artifact, slots: &SlotTable) -> Result<()>;
}
