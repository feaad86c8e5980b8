//! Mock fetchers and native remotes shared by the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use fedrun::ExposedContainer;
use fedrun::Module;
use fedrun::NativeEnvironment;
use fedrun::fetch;
use fedrun::fetch::Fetcher;

/// What the mock serves for one URL.
#[derive(Clone)]
pub enum Route {
    Body { bytes: Vec<u8>, delay: Duration },
    Fail(fetch::Error),
}

/// A fetcher serving canned responses and counting requests per URL.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, body: &str) -> Self {
        self.serve_after(url, body, Duration::ZERO)
    }

    pub fn serve_after(self, url: &str, body: &str, delay: Duration) -> Self {
        self.route(url, Route::Body { bytes: body.as_bytes().to_vec(), delay })
    }

    pub fn fail(self, url: &str, error: fetch::Error) -> Self {
        self.route(url, Route::Fail(error))
    }

    pub fn route(self, url: &str, route: Route) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), route);
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> fetch::Result<Vec<u8>> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let route = self.routes.lock().unwrap().get(url).cloned();

        match route {
            Some(Route::Body { bytes, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(bytes)
            }
            Some(Route::Fail(e)) => Err(e),
            None => Err(fetch::Error::Unreachable(format!("no route to {}", url))),
        }
    }
}

/// The action module each demo remote exposes.
pub struct Action {
    pub greeting: String,
}

pub fn action(greeting: &str) -> Module {
    Module::new(Action { greeting: greeting.to_string() })
}

pub fn greeting(module: &Module) -> &str {
    &module.downcast_ref::<Action>().unwrap().greeting
}

/// Native environment providing the three demo remotes under entries `foo`, `bar`, `baz`.
pub fn demo_environment() -> NativeEnvironment {
    NativeEnvironment::new()
        .provide("foo", "RemoteModuleFoo", || {
            Arc::new(
                ExposedContainer::builder("RemoteModuleFoo")
                    .expose("./action", || action("Remote foo says hello"))
                    .share("lodash/toUpper", || Module::new("foo-bundled".to_string()), false)
                    .build(),
            )
        })
        .provide("bar", "RemoteModuleBar", || {
            Arc::new(
                ExposedContainer::builder("RemoteModuleBar")
                    .expose("./action", || action("Remote bar says hello"))
                    .build(),
            )
        })
        .provide("baz", "RemoteModuleBaz", || {
            Arc::new(
                ExposedContainer::builder("RemoteModuleBaz")
                    .expose("./action", || action("Remote baz says hello"))
                    .require("lodash/toUpper")
                    .build(),
            )
        })
        // Registers under a name nobody asks for.
        .provide("misnamed", "SomethingElse", || {
            Arc::new(ExposedContainer::builder("SomethingElse").build())
        })
}

pub const FOO_URL: &str = "http://host-a/dist/moduleEntry.wasm";
pub const BAR_URL: &str = "http://host-b/dist/moduleEntry.wasm";
pub const BAZ_URL: &str = "http://host-c/dist/moduleEntry.wasm";
