//! # Wasm Remotes
//!
//! Entry artifacts compiled to core WebAssembly. Executing one compiles and
//! instantiates the module; the export names decide the slot it registers under.
//!
//! ## Container ABI
//!
//! A module registering the container `Name` exports:
//!
//! - `memory`
//! - `Name.alloc(len: i32) -> i32`: scratch buffer for request strings
//! - `Name.init() -> i32`: 0 ok, 1 already initialized, anything else fails
//! - `Name.get(ptr: i32, len: i32) -> i32`: export handle, or -1 when not exposed
//! - `Name.call(handle: i32) -> i64`: runs the export, returns `(ptr << 32) | len`
//!   of a UTF-8 string
//!
//! Wasm containers cannot hold host instances, so `init` ignores the share scope.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use wasmtime::Engine;
use wasmtime::Linker;
use wasmtime::Memory;
use wasmtime::Module as WasmModule;
use wasmtime::Store;
use wasmtime::TypedFunc;

use crate::container::Container;
use crate::container::ExportFactory;
use crate::container::GetError;
use crate::container::InitError;
use crate::environment;
use crate::environment::Artifact;
use crate::environment::Environment;
use crate::environment::SlotTable;
use crate::share::Module;
use crate::share::ShareScope;

const INIT_SUFFIX: &str = ".init";

#[derive(Debug)]
pub enum Error {
    Execution(wasmtime::Error),
    Memory(String),
    InvalidResult(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execution(e) => write!(f, "Execution error: {}", e),
            Self::Memory(msg) => write!(f, "Memory error: {}", msg),
            Self::InvalidResult(msg) => write!(f, "Invalid result: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<wasmtime::Error> for Error {
    fn from(e: wasmtime::Error) -> Self {
        Self::Execution(e)
    }
}

impl From<wasmtime::MemoryAccessError> for Error {
    fn from(e: wasmtime::MemoryAccessError) -> Self {
        Self::Memory(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Compiles and instantiates wasm entry artifacts.
#[derive(Clone)]
pub struct WasmEnvironment {
    engine: Engine,
}

impl WasmEnvironment {
    /// Creates an environment with an async-capable engine.
    pub fn new() -> Result<Self> {
        let mut config = wasmtime::Config::new();
        config.async_support(true);
        let engine = Engine::new(&config)?;
        Ok(Self { engine })
    }

    pub fn with_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compiles, instantiates and shape-checks a module without registering it.
    pub async fn instantiate(&self, bytes: &[u8]) -> environment::Result<WasmContainer> {
        let module = WasmModule::new(&self.engine, bytes)
            .map_err(|e| environment::Error::Malformed(e.to_string()))?;
        let name = container_name(&module)?;

        let linker = Linker::<()>::new(&self.engine);
        let mut store = Store::new(&self.engine, ());
        let instance = linker
            .instantiate_async(&mut store, &module)
            .await
            .map_err(|e| environment::Error::Runtime(e.to_string()))?;

        let shape = |e: wasmtime::Error| environment::Error::Shape(format!("{}: {}", name, e));
        let exports = Exports {
            alloc: instance
                .get_typed_func::<i32, i32>(&mut store, &format!("{}.alloc", name))
                .map_err(shape)?,
            init: instance
                .get_typed_func::<(), i32>(&mut store, &format!("{}.init", name))
                .map_err(shape)?,
            get: instance
                .get_typed_func::<(i32, i32), i32>(&mut store, &format!("{}.get", name))
                .map_err(shape)?,
            call: instance
                .get_typed_func::<i32, i64>(&mut store, &format!("{}.call", name))
                .map_err(shape)?,
            memory: instance
                .get_memory(&mut store, "memory")
                .ok_or_else(|| environment::Error::Shape(format!("{}: no exported memory", name)))?,
        };

        Ok(WasmContainer {
            name,
            inner: Arc::new(Mutex::new(State { store, exports })),
        })
    }
}

#[async_trait::async_trait]
impl Environment for WasmEnvironment {
    async fn execute(&self, artifact: &Artifact, slots: &SlotTable) -> environment::Result<()> {
        let container = self.instantiate(&artifact.bytes).await?;
        debug!(url = %artifact.url, slot = %container.name, "wasm entry instantiated");
        let name = container.name.clone();
        slots.register(&name, Arc::new(container));
        Ok(())
    }
}

/// The single `Name` for which the module exports `Name.init`.
fn container_name(module: &WasmModule) -> environment::Result<String> {
    let mut names: Vec<String> = module
        .exports()
        .filter_map(|export| export.name().strip_suffix(INIT_SUFFIX).map(str::to_string))
        .collect();

    match names.len() {
        1 => Ok(names.remove(0)),
        0 => Err(environment::Error::Shape("no '<name>.init' export".into())),
        _ => Err(environment::Error::Shape(format!(
            "multiple containers exported: {}",
            names.join(", ")
        ))),
    }
}

struct Exports {
    alloc: TypedFunc<i32, i32>,
    init: TypedFunc<(), i32>,
    get: TypedFunc<(i32, i32), i32>,
    call: TypedFunc<i32, i64>,
    memory: Memory,
}

/// Store and exports of one instantiated module.
///
/// Wasmtime's Store needs exclusive access, so it lives behind an async mutex shared
/// by the container and every export handed out from it.
struct State {
    store: Store<()>,
    exports: Exports,
}

/// A container backed by a wasm instance.
pub struct WasmContainer {
    name: String,
    inner: Arc<Mutex<State>>,
}

impl WasmContainer {
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, request: &str) -> Result<i32> {
        let mut guard = self.inner.lock().await;
        let State { store, exports } = &mut *guard;

        let len = i32::try_from(request.len())
            .map_err(|_| Error::Memory("request too long".into()))?;
        let ptr = exports.alloc.call_async(&mut *store, len).await?;
        let offset = usize::try_from(ptr)
            .map_err(|_| Error::InvalidResult(format!("alloc returned {}", ptr)))?;
        exports.memory.write(&mut *store, offset, request.as_bytes())?;

        Ok(exports.get.call_async(&mut *store, (ptr, len)).await?)
    }
}

#[async_trait::async_trait]
impl Container for WasmContainer {
    async fn init(&self, _scope: &ShareScope) -> std::result::Result<(), InitError> {
        let mut guard = self.inner.lock().await;
        let State { store, exports } = &mut *guard;

        let status = exports
            .init
            .call_async(&mut *store, ())
            .await
            .map_err(|e| InitError::Failed(e.to_string()))?;

        match status {
            0 => Ok(()),
            1 => Err(InitError::AlreadyInitialized),
            code => Err(InitError::Failed(format!("init returned status {}", code))),
        }
    }

    async fn get(&self, request: &str) -> std::result::Result<ExportFactory, GetError> {
        let handle = self
            .lookup(request)
            .await
            .map_err(|e| GetError::Failed(e.to_string()))?;

        match handle {
            -1 => Err(GetError::NotFound),
            h if h < 0 => Err(GetError::Failed(format!("get returned {}", h))),
            h => {
                let inner = self.inner.clone();
                let container = self.name.clone();
                let request = request.to_string();
                Ok(Arc::new(move || {
                    Module::new(WasmExport {
                        container: container.clone(),
                        request: request.clone(),
                        handle: h,
                        inner: inner.clone(),
                    })
                }))
            }
        }
    }
}

/// An export resolved from a wasm container. Calling it runs guest code.
#[derive(Clone)]
pub struct WasmExport {
    container: String,
    request: String,
    handle: i32,
    inner: Arc<Mutex<State>>,
}

impl WasmExport {
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    /// Invokes the export and returns the string it produced.
    pub async fn call(&self) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let State { store, exports } = &mut *guard;

        let packed = exports.call.call_async(&mut *store, self.handle).await?;
        if packed < 0 {
            return Err(Error::InvalidResult(format!(
                "{} '{}' returned {}",
                self.container, self.request, packed
            )));
        }

        let ptr = (packed >> 32) as usize;
        let len = (packed & 0xffff_ffff) as usize;
        let size = exports.memory.data_size(&*store);
        if ptr.checked_add(len).is_none_or(|end| end > size) {
            return Err(Error::Memory(format!(
                "{} '{}' result {}+{} exceeds memory of {} bytes",
                self.container, self.request, ptr, len, size
            )));
        }
        let mut buf = vec![0u8; len];
        exports.memory.read(&*store, ptr, &mut buf)?;

        String::from_utf8(buf).map_err(|e| Error::InvalidResult(e.to_string()))
    }
}

impl std::fmt::Debug for WasmExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmExport")
            .field("container", &self.container)
            .field("request", &self.request)
            .field("handle", &self.handle)
            .finish()
    }
}
