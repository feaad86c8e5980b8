//! # Federation Client
//!
//! The facade an application uses to pull a named export out of a named remote.
//!
//! A request walks four steps, each with its own failure:
//!
//! 1. resolve the remote's descriptor (`UnknownRemote`)
//! 2. load its container, once per remote (`RemoteLoad`)
//! 3. initialize the container against the share scope, once per container
//! 4. `get` the export (`ExportNotFound`)
//!
//! Nothing is retried automatically. Issuing the same request after a failure is
//! the retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::container::ExportHandle;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::loader::ScriptLoader;
use crate::registry::RemoteRegistry;
use crate::remote::LoadState;
use crate::remote::RemoteId;
use crate::share::Module;
use crate::share::ShareScope;

#[derive(Clone)]
pub struct FederationClient {
    registry: RemoteRegistry,
    loader: ScriptLoader,
    scope: ShareScope,
}

impl FederationClient {
    pub fn builder(
        fetcher: impl Fetcher,
        environment: impl Environment,
    ) -> FederationClientBuilder {
        FederationClientBuilder {
            fetcher: Arc::new(fetcher),
            environment: Arc::new(environment),
            registry: None,
            scope: None,
        }
    }

    pub fn registry(&self) -> &RemoteRegistry {
        &self.registry
    }

    pub fn share_scope(&self) -> &ShareScope {
        &self.scope
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    pub fn load_state(&self, id: &RemoteId) -> LoadState {
        self.loader.state(id)
    }

    /// Loads and initializes `remote`, then resolves `path` to an export handle
    /// without invoking it.
    pub async fn request_handle(&self, remote: &RemoteId, path: &str) -> Result<ExportHandle> {
        let descriptor = self.registry.freeze(remote)?;
        let container = self.loader.load(&descriptor).await?;
        container.init(&self.scope).await?;
        debug!(remote = %remote, export = path, "resolving export");
        container.get(path).await
    }

    /// Requests `path` from `remote` and returns the export.
    pub async fn request_export(&self, remote: impl Into<RemoteId>, path: &str) -> Result<Module> {
        let remote = remote.into();
        let handle = self.request_handle(&remote, path).await?;
        Ok(handle.invoke())
    }

    /// Like [`request_export`](Self::request_export) but gives up after `timeout`.
    ///
    /// Giving up only abandons this caller's wait; the underlying load keeps running
    /// and still fills the cache.
    pub async fn request_export_timeout(
        &self,
        remote: impl Into<RemoteId>,
        path: &str,
        timeout: Duration,
    ) -> Result<Module> {
        let remote = remote.into();
        match tokio::time::timeout(timeout, self.request_export(remote.clone(), path)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(remote = %remote, export = path, ?timeout, "request timed out");
                Err(Error::Timeout {
                    id: remote,
                    request: path.to_string(),
                })
            }
        }
    }
}

/// Fluent builder for a [`FederationClient`].
pub struct FederationClientBuilder {
    fetcher: Arc<dyn Fetcher>,
    environment: Arc<dyn Environment>,
    registry: Option<RemoteRegistry>,
    scope: Option<ShareScope>,
}

impl FederationClientBuilder {
    /// Uses an existing registry, e.g. one already populated from configuration.
    pub fn registry(mut self, registry: RemoteRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses an existing share scope, e.g. one the host already declared into.
    pub fn share_scope(mut self, scope: ShareScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn build(self) -> FederationClient {
        FederationClient {
            registry: self.registry.unwrap_or_default(),
            loader: ScriptLoader::new(self.fetcher, self.environment),
            scope: self.scope.unwrap_or_default(),
        }
    }
}
