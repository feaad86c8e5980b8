//! # Share Scope
//!
//! Process-wide table of shared dependencies. Host and remotes that bundle the same
//! library declare it here, and everyone ends up holding the one instance that the
//! first declaration produced.
//!
//! ## Invariants
//!
//! - First declaration for a name wins; later declarations never replace it.
//! - At most one instance per name is ever constructed, even under concurrent resolves.
//! - Eager declarations construct at declaration time, lazy ones on first resolve.

use std::any::Any;
use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use tracing::debug;

/// A type-erased loaded module: a shared library instance or a remote export.
#[derive(Clone)]
pub struct Module(Arc<dyn Any + Send + Sync>);

impl Module {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// True when both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Module({:p})", Arc::as_ptr(&self.0))
    }
}

/// Builds a shared instance. Called at most once per name.
pub type ModuleFactory = Arc<dyn Fn() -> Module + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    SharedDependencyMissing(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedDependencyMissing(name) => {
                write!(f, "Shared dependency not declared: {}", name)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

struct Entry {
    factory: ModuleFactory,
    instance: OnceLock<Module>,
}

impl Entry {
    fn get_or_construct(&self, name: &str) -> Module {
        self.instance
            .get_or_init(|| {
                debug!(dependency = name, "constructing shared instance");
                (self.factory)()
            })
            .clone()
    }
}

/// Cloning a `ShareScope` yields another handle to the same table.
#[derive(Clone, Default)]
pub struct ShareScope {
    entries: Arc<DashMap<String, Arc<Entry>>>,
}

impl ShareScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a shared dependency.
    ///
    /// Returns the instance if one exists after this call: always for eager declarations
    /// and for names that were already resolved, `None` for a lazy one not yet resolved.
    pub fn declare<F>(&self, name: &str, factory: F, eager: bool) -> Option<Module>
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(dependency = name, eager, "declared shared dependency");
                Arc::new(Entry {
                    factory: Arc::new(factory),
                    instance: OnceLock::new(),
                })
            })
            .clone();

        if eager {
            Some(entry.get_or_construct(name))
        } else {
            entry.instance.get().cloned()
        }
    }

    /// Returns the shared instance, constructing it on first use.
    pub fn resolve(&self, name: &str) -> Result<Module> {
        let entry = self
            .entries
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::SharedDependencyMissing(name.to_string()))?;
        Ok(entry.get_or_construct(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_constructed(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|e| e.instance.get().is_some())
            .unwrap_or(false)
    }

    /// Declared names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ShareScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareScope").field("names", &self.names()).finish()
    }
}
