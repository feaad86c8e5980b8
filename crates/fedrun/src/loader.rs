//! # Script Loader
//!
//! Fetches each remote's entry artifact exactly once and hands back the container it
//! registered.
//!
//! ## Invariants
//!
//! - At most one fetch per remote is in flight at any time. Callers arriving while a
//!   load is running join it and receive the same result.
//! - A loaded remote is never fetched again; every caller gets the same proxy.
//! - A failed remote stays failed until a caller asks again, which starts a new fetch.
//! - Loads run as spawned tasks. A caller that stops waiting does not stop the load,
//!   which still settles and populates the cache for everyone else.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::container::ContainerProxy;
use crate::environment::Artifact;
use crate::environment::Environment;
use crate::environment::SlotTable;
use crate::error::Error;
use crate::error::LoadCause;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::remote::LoadState;
use crate::remote::RemoteDescriptor;
use crate::remote::RemoteId;

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<ContainerProxy>>>>;

enum Slot {
    Loading(LoadFuture),
    Loaded(Arc<ContainerProxy>),
    Failed(Error),
}

impl Slot {
    fn state(&self) -> LoadState {
        match self {
            Self::Loading(_) => LoadState::Loading,
            Self::Loaded(_) => LoadState::Loaded,
            Self::Failed(_) => LoadState::Failed,
        }
    }
}

/// Cloning a `ScriptLoader` yields another handle to the same cache.
#[derive(Clone)]
pub struct ScriptLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    fetcher: Arc<dyn Fetcher>,
    environment: Arc<dyn Environment>,
    slots: SlotTable,
    loads: DashMap<RemoteId, Slot>,
}

impl ScriptLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, environment: Arc<dyn Environment>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                fetcher,
                environment,
                slots: SlotTable::new(),
                loads: DashMap::new(),
            }),
        }
    }

    pub fn slots(&self) -> &SlotTable {
        &self.inner.slots
    }

    pub fn state(&self, id: &RemoteId) -> LoadState {
        self.inner
            .loads
            .get(id)
            .map(|slot| slot.state())
            .unwrap_or(LoadState::NotRequested)
    }

    /// The last failure recorded for a remote, if it is currently `Failed`.
    pub fn last_error(&self, id: &RemoteId) -> Option<Error> {
        self.inner.loads.get(id).and_then(|slot| match slot.value() {
            Slot::Failed(e) => Some(e.clone()),
            _ => None,
        })
    }

    /// Loads the remote described by `descriptor`, or joins the load already running.
    pub async fn load(&self, descriptor: &RemoteDescriptor) -> Result<Arc<ContainerProxy>> {
        let id = &descriptor.id;
        let pending = match self.inner.loads.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let joined = match entry.get() {
                    Slot::Loaded(proxy) => {
                        debug!(remote = %id, "container cache hit");
                        return Ok(proxy.clone());
                    }
                    Slot::Loading(pending) => Some(pending.clone()),
                    Slot::Failed(_) => None,
                };
                match joined {
                    Some(pending) => {
                        debug!(remote = %id, "joining in-flight load");
                        pending
                    }
                    None => {
                        info!(remote = %id, "retrying failed remote");
                        let pending = self.start(descriptor.clone());
                        entry.insert(Slot::Loading(pending.clone()));
                        pending
                    }
                }
            }
            Entry::Vacant(entry) => {
                let pending = self.start(descriptor.clone());
                entry.insert(Slot::Loading(pending.clone()));
                pending
            }
        };
        pending.await
    }

    /// Spawns the fetch/execute task. The task records its own outcome before any
    /// waiter observes it, so `state()` is settled by the time `load` returns.
    fn start(&self, descriptor: RemoteDescriptor) -> LoadFuture {
        let inner = self.inner.clone();
        let id = descriptor.id.clone();

        let task = tokio::spawn(async move {
            let result = inner.fetch_and_register(&descriptor).await;
            inner.settle(&descriptor.id, &result);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::load(&id, LoadCause::Aborted(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }
}

impl LoaderInner {
    async fn fetch_and_register(&self, descriptor: &RemoteDescriptor) -> Result<Arc<ContainerProxy>> {
        let id = &descriptor.id;
        let url = descriptor.entry_url();
        info!(remote = %id, %url, "fetching entry artifact");

        let bytes = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| Error::load(id, LoadCause::Fetch(e)))?;

        let artifact = Artifact { url, bytes };
        self.environment
            .execute(&artifact, &self.slots)
            .await
            .map_err(|e| Error::load(id, LoadCause::Execute(e)))?;

        self.slots
            .get(id.as_str())
            .ok_or_else(|| Error::load(id, LoadCause::SlotMissing))
    }

    fn settle(&self, id: &RemoteId, result: &Result<Arc<ContainerProxy>>) {
        let slot = match result {
            Ok(proxy) => {
                info!(remote = %id, "remote loaded");
                Slot::Loaded(proxy.clone())
            }
            Err(e) => {
                warn!(remote = %id, error = %e, "remote failed to load");
                Slot::Failed(e.clone())
            }
        };
        self.loads.insert(id.clone(), slot);
    }
}
