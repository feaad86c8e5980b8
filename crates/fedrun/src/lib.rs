//! # fedrun
//!
//! Runtime for federated code loading. A host names remotes and their base URLs,
//! then asks for exports; fedrun fetches each remote's entry artifact once, turns it
//! into a container, initializes it against a shared dependency scope and resolves
//! the requested export.

pub mod client;
pub mod config;
pub mod container;
pub mod environment;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod native;
pub mod orchestrator;
pub mod registry;
pub mod remote;
pub mod share;
pub mod wasm;

pub use client::FederationClient;
pub use config::FederationConfig;
pub use container::Container;
pub use container::ContainerProxy;
pub use environment::Environment;
pub use environment::SlotTable;
pub use error::Error;
pub use error::LoadCause;
pub use fetch::Fetcher;
pub use fetch::HttpFetcher;
pub use native::ExposedContainer;
pub use native::NativeEnvironment;
pub use orchestrator::Orchestrator;
pub use orchestrator::Step;
pub use registry::RemoteRegistry;
pub use remote::LoadState;
pub use remote::RemoteDescriptor;
pub use remote::RemoteId;
pub use share::Module;
pub use share::ShareScope;
pub use wasm::WasmEnvironment;
