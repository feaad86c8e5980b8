//! # Native Remotes
//!
//! Remotes whose code is linked into the host binary. The entry artifact is a small
//! UTF-8 document naming an entry point; executing it registers the container that
//! entry point builds. Deploying a new remote still means publishing a new artifact,
//! only the code it selects is already present.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tracing::debug;

use crate::container::Container;
use crate::container::ExportFactory;
use crate::container::GetError;
use crate::container::InitError;
use crate::environment;
use crate::environment::Artifact;
use crate::environment::Environment;
use crate::environment::SlotTable;
use crate::share;
use crate::share::Module;
use crate::share::ShareScope;

type ContainerFactory = Arc<dyn Fn() -> Arc<dyn Container> + Send + Sync>;

struct NativeEntry {
    slot: String,
    factory: ContainerFactory,
}

/// Environment for host-linked remotes.
#[derive(Clone, Default)]
pub struct NativeEnvironment {
    entries: Arc<DashMap<String, Arc<NativeEntry>>>,
}

impl NativeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `entry` executable: running it registers `factory()` under `slot`.
    pub fn provide<F>(self, entry: impl Into<String>, slot: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Container> + Send + Sync + 'static,
    {
        self.entries.insert(
            entry.into(),
            Arc::new(NativeEntry {
                slot: slot.into(),
                factory: Arc::new(factory),
            }),
        );
        self
    }
}

#[async_trait::async_trait]
impl Environment for NativeEnvironment {
    async fn execute(&self, artifact: &Artifact, slots: &SlotTable) -> environment::Result<()> {
        let text = std::str::from_utf8(&artifact.bytes)
            .map_err(|e| environment::Error::Malformed(format!("{}: {}", artifact.url, e)))?;
        let entry_name = text.trim();

        let entry = self
            .entries
            .get(entry_name)
            .map(|e| e.value().clone())
            .ok_or_else(|| environment::Error::UnknownEntry(entry_name.to_string()))?;

        debug!(entry = entry_name, slot = %entry.slot, "executing native entry");
        slots.register(&entry.slot, (entry.factory)());
        Ok(())
    }
}

struct SharedDecl {
    factory: share::ModuleFactory,
    eager: bool,
}

/// A native container built from a table of exposed paths.
///
/// On init it declares its shared dependencies into the scope (first declaration
/// wins, so it adopts whatever the host already provided) and checks the ones it
/// requires. Like a real bundle, a second init reports `AlreadyInitialized`.
pub struct ExposedContainer {
    name: String,
    exposes: HashMap<String, ExportFactory>,
    shared: Vec<(String, SharedDecl)>,
    requires: HashSet<String>,
    initialized: AtomicBool,
}

impl ExposedContainer {
    pub fn builder(name: impl Into<String>) -> ExposedContainerBuilder {
        ExposedContainerBuilder {
            name: name.into(),
            exposes: HashMap::new(),
            shared: Vec::new(),
            requires: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait::async_trait]
impl Container for ExposedContainer {
    async fn init(&self, scope: &ShareScope) -> Result<(), InitError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(InitError::AlreadyInitialized);
        }

        for (name, decl) in &self.shared {
            let factory = decl.factory.clone();
            scope.declare(name, move || factory(), decl.eager);
        }

        for name in &self.requires {
            if let Err(share::Error::SharedDependencyMissing(missing)) = scope.resolve(name) {
                self.initialized.store(false, Ordering::SeqCst);
                return Err(InitError::SharedDependencyMissing(missing));
            }
        }

        Ok(())
    }

    async fn get(&self, request: &str) -> Result<ExportFactory, GetError> {
        self.exposes.get(request).cloned().ok_or(GetError::NotFound)
    }
}

pub struct ExposedContainerBuilder {
    name: String,
    exposes: HashMap<String, ExportFactory>,
    shared: Vec<(String, SharedDecl)>,
    requires: HashSet<String>,
}

impl ExposedContainerBuilder {
    /// Exposes `path`. The factory runs each time the export is invoked.
    pub fn expose<F>(mut self, path: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        self.exposes.insert(path.into(), Arc::new(factory));
        self
    }

    /// Bundles a copy of a shared dependency, offered to the scope on init.
    pub fn share<F>(mut self, name: impl Into<String>, factory: F, eager: bool) -> Self
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        self.shared.push((
            name.into(),
            SharedDecl {
                factory: Arc::new(factory),
                eager,
            },
        ));
        self
    }

    /// Requires a shared dependency someone else must declare.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.requires.insert(name.into());
        self
    }

    pub fn build(self) -> ExposedContainer {
        ExposedContainer {
            name: self.name,
            exposes: self.exposes,
            shared: self.shared,
            requires: self.requires,
            initialized: AtomicBool::new(false),
        }
    }
}
