//! Demo host: loads three wasm remotes in sequence and runs their actions.
//!
//! Remote locations come from `FEDRUN_CONFIG` (a JSON file) when set, otherwise from
//! the localhost defaults below; either can be overridden per remote with
//! `FEDRUN_URL_<ID>`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use fedrun::FederationClient;
use fedrun::FederationConfig;
use fedrun::HttpFetcher;
use fedrun::Module;
use fedrun::Orchestrator;
use fedrun::RemoteId;
use fedrun::Step;
use fedrun::WasmEnvironment;
use fedrun::config::RemoteConfig;
use fedrun::orchestrator::StepOutcome;
use fedrun::wasm::WasmExport;
use tracing::error;
use tracing_subscriber::EnvFilter;

const TO_UPPER: &str = "lodash/toUpper";

/// The host's copy of its one shared library.
struct ToUpper;

impl ToUpper {
    fn apply(&self, s: &str) -> String {
        s.to_uppercase()
    }
}

fn default_config() -> FederationConfig {
    FederationConfig::default()
        .remote(RemoteConfig::new("RemoteModuleFoo", "http://localhost:8001"))
        .remote(RemoteConfig::new("RemoteModuleBar", "http://localhost:8002"))
        .remote(RemoteConfig::new("RemoteModuleBaz", "http://localhost:8003"))
}

fn load_config() -> Result<FederationConfig> {
    let config = match std::env::var("FEDRUN_CONFIG") {
        Ok(path) => FederationConfig::from_file(&path)
            .with_context(|| format!("reading config from {}", path))?,
        Err(_) => default_config(),
    };
    Ok(config.with_env_overrides())
}

/// Printed next to each action's output, on the same stream.
fn loaded_message(remote: &RemoteId) -> String {
    format!("Loaded remote module {}", remote)
}

async fn report(outcome: StepOutcome) {
    let module = match outcome.result {
        Ok(module) => module,
        Err(e) => {
            error!(remote = %outcome.remote, "{}", e);
            return;
        }
    };

    println!("{}", loaded_message(&outcome.remote));
    match module.downcast_ref::<WasmExport>() {
        Some(action) => match action.call().await {
            Ok(text) => println!("{}", text),
            Err(e) => error!(remote = %outcome.remote, "action failed: {}", e),
        },
        None => error!(remote = %outcome.remote, "export is not a wasm action"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let fetcher = HttpFetcher::new()?;
    let environment = WasmEnvironment::new()?;
    let client = Arc::new(FederationClient::builder(fetcher, environment).build());
    load_config()?.apply(client.registry());

    let to_upper: Module = client
        .share_scope()
        .declare(TO_UPPER, || Module::new(ToUpper), true)
        .context("eager shared dependency was not constructed")?;
    if let Some(to_upper) = to_upper.downcast_ref::<ToUpper>() {
        println!("{} says hello world!", to_upper.apply("Host"));
    }

    let mut orchestrator = Orchestrator::new(client.clone()).steps([
        Step::new("RemoteModuleFoo", "./action", Duration::from_millis(2000)),
        Step::new("RemoteModuleBar", "./action", Duration::from_millis(1000)),
        Step::new("RemoteModuleBaz", "./action", Duration::from_millis(1000)),
    ]);
    let mut events = orchestrator.subscribe();

    let reporter = tokio::spawn(async move {
        while let Some(outcome) = events.recv().await {
            report(outcome).await;
        }
    });

    orchestrator.run().await;
    reporter.await?;
    Ok(())
}
