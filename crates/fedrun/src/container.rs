//! # Containers
//!
//! A container is what a remote's entry artifact leaves behind once executed: an
//! object offering `init(share_scope)` and `get(request)`. The raw [`Container`]
//! trait is the boundary contract that every artifact kind implements.
//!
//! [`ContainerProxy`] wraps a raw container with the guarantees callers rely on:
//!
//! - `init` takes effect at most once. Later calls are observed and suppressed,
//!   and a raw "already initialized" signal is logged, never returned.
//! - Any other init failure is fatal and reported as a load error.
//! - `get` maps "no such path" to `ExportNotFound`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::Error;
use crate::error::LoadCause;
use crate::error::Result;
use crate::remote::RemoteId;
use crate::share::Module;
use crate::share::ShareScope;

/// Raw init outcomes a container may report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The container had already been initialized by someone else.
    AlreadyInitialized,
    /// The container requires a shared dependency nobody declared.
    SharedDependencyMissing(String),
    Failed(String),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "Container already initialized"),
            Self::SharedDependencyMissing(name) => {
                write!(f, "Shared dependency missing: {}", name)
            }
            Self::Failed(msg) => write!(f, "Init failed: {}", msg),
        }
    }
}

impl std::error::Error for InitError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetError {
    NotFound,
    Failed(String),
}

impl std::fmt::Display for GetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Export not found"),
            Self::Failed(msg) => write!(f, "Get failed: {}", msg),
        }
    }
}

impl std::error::Error for GetError {}

/// Produces an exported module. Nothing behind the export runs until it is invoked.
pub type ExportFactory = Arc<dyn Fn() -> Module + Send + Sync>;

/// The `get`/`init` contract a loaded remote must honor.
///
/// This trait is designed to be object-safe (`Arc<dyn Container>`).
#[async_trait::async_trait]
pub trait Container: Send + Sync + 'static {
    /// Initializes the container against the host's share scope.
    ///
    /// Implementations may report `AlreadyInitialized` on repeat calls; the proxy
    /// treats that as advisory.
    async fn init(&self, scope: &ShareScope) -> std::result::Result<(), InitError>;

    /// Looks up an exposed path and returns a factory for it.
    async fn get(&self, request: &str) -> std::result::Result<ExportFactory, GetError>;
}

/// A resolved `get`: call [`ExportHandle::invoke`] to produce the export.
#[derive(Clone)]
pub struct ExportHandle {
    remote: RemoteId,
    request: String,
    factory: ExportFactory,
}

impl ExportHandle {
    pub fn remote(&self) -> &RemoteId {
        &self.remote
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn invoke(&self) -> Module {
        (self.factory)()
    }
}

impl std::fmt::Debug for ExportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportHandle")
            .field("remote", &self.remote)
            .field("request", &self.request)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initialized,
}

/// Stable, idempotent view over a raw container.
pub struct ContainerProxy {
    id: RemoteId,
    raw: Arc<dyn Container>,
    state: Mutex<InitState>,
}

impl ContainerProxy {
    pub fn new(id: RemoteId, raw: Arc<dyn Container>) -> Self {
        Self {
            id,
            raw,
            state: Mutex::new(InitState::Uninitialized),
        }
    }

    pub fn id(&self) -> &RemoteId {
        &self.id
    }

    pub async fn init_state(&self) -> InitState {
        *self.state.lock().await
    }

    /// Initializes the raw container once.
    ///
    /// The state lock is held across the raw call so concurrent callers wait for the
    /// first one and then observe `Initialized`.
    pub async fn init(&self, scope: &ShareScope) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == InitState::Initialized {
            debug!(remote = %self.id, "repeat init suppressed");
            return Ok(());
        }

        match self.raw.init(scope).await {
            Ok(()) => {
                info!(remote = %self.id, "container initialized");
                *state = InitState::Initialized;
                Ok(())
            }
            Err(InitError::AlreadyInitialized) => {
                warn!(remote = %self.id, "{} has already been loaded", self.id);
                *state = InitState::Initialized;
                Ok(())
            }
            Err(InitError::SharedDependencyMissing(name)) => {
                Err(Error::SharedDependencyMissing {
                    id: self.id.clone(),
                    name,
                })
            }
            Err(InitError::Failed(msg)) => Err(Error::load(&self.id, LoadCause::Init(msg))),
        }
    }

    pub async fn get(&self, request: &str) -> Result<ExportHandle> {
        match self.raw.get(request).await {
            Ok(factory) => Ok(ExportHandle {
                remote: self.id.clone(),
                request: request.to_string(),
                factory,
            }),
            Err(GetError::NotFound) => Err(Error::ExportNotFound {
                id: self.id.clone(),
                request: request.to_string(),
            }),
            Err(GetError::Failed(msg)) => Err(Error::load(&self.id, LoadCause::Get(msg))),
        }
    }

    /// True when both proxies wrap the same raw container.
    pub fn same_container(&self, other: &ContainerProxy) -> bool {
        Arc::ptr_eq(&self.raw, &other.raw)
    }
}

impl std::fmt::Debug for ContainerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerProxy").field("id", &self.id).finish()
    }
}
