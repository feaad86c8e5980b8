//! Integration tests for the federation client and orchestrator.

mod support;

use std::sync::Arc;
use std::time::Duration;

use fedrun::Error;
use fedrun::FederationClient;
use fedrun::LoadCause;
use fedrun::LoadState;
use fedrun::Module;
use fedrun::Orchestrator;
use fedrun::RemoteId;
use fedrun::Step;
use fedrun::fetch;
use fedrun::orchestrator::Phase;
use fedrun::registry::Update;

use support::BAR_URL;
use support::BAZ_URL;
use support::FOO_URL;
use support::MockFetcher;
use support::demo_environment;
use support::greeting;

fn client(fetcher: &MockFetcher) -> FederationClient {
    let client = FederationClient::builder(fetcher.clone(), demo_environment()).build();
    client.registry().configure("RemoteModuleFoo", "http://host-a/dist");
    client.registry().configure("RemoteModuleBar", "http://host-b/dist");
    client.registry().configure("RemoteModuleBaz", "http://host-c/dist");
    client
}

// --- Single remote ---

#[tokio::test]
async fn test_request_export_fetches_once() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "foo");
    let client = client(&fetcher);

    let action = client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    assert_eq!(greeting(&action), "Remote foo says hello");
    assert_eq!(fetcher.hits(FOO_URL), 1);
    assert_eq!(client.load_state(&RemoteId::from("RemoteModuleFoo")), LoadState::Loaded);

    client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    assert_eq!(fetcher.hits(FOO_URL), 1);
}

#[tokio::test]
async fn test_concurrent_requests_coalesce() {
    let fetcher = MockFetcher::new().serve_after(FOO_URL, "foo", Duration::from_millis(50));
    let client = Arc::new(client(&fetcher));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.request_export("RemoteModuleFoo", "./action").await })
        })
        .collect();

    for task in tasks {
        let action = task.await.unwrap().unwrap();
        assert_eq!(greeting(&action), "Remote foo says hello");
    }
    assert_eq!(fetcher.hits(FOO_URL), 1);
}

#[tokio::test]
async fn test_concurrent_failures_are_identical() {
    let fetcher = MockFetcher::new().fail(FOO_URL, fetch::Error::Status(503));
    let client = Arc::new(client(&fetcher));

    let results = futures::future::join_all(
        (0..4).map(|_| client.request_export("RemoteModuleFoo", "./action")),
    )
    .await;

    for result in results {
        assert!(matches!(
            result,
            Err(Error::RemoteLoad { cause: LoadCause::Fetch(fetch::Error::Status(503)), .. })
        ));
    }
    assert_eq!(fetcher.hits(FOO_URL), 1);
}

#[tokio::test]
async fn test_unknown_remote() {
    let client = client(&MockFetcher::new());
    let err = client.request_export("RemoteModuleQux", "./action").await.unwrap_err();
    assert!(matches!(err, Error::UnknownRemote(id) if id.as_str() == "RemoteModuleQux"));
}

#[tokio::test]
async fn test_export_not_found() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "foo");
    let client = client(&fetcher);

    let err = client.request_export("RemoteModuleFoo", "./nope").await.unwrap_err();
    assert!(matches!(err, Error::ExportNotFound { request, .. } if request == "./nope"));
    // The remote itself loaded fine.
    assert_eq!(client.load_state(&RemoteId::from("RemoteModuleFoo")), LoadState::Loaded);
}

#[tokio::test]
async fn test_missing_slot_is_a_load_error() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "misnamed");
    let client = client(&fetcher);

    let err = client.request_export("RemoteModuleFoo", "./action").await.unwrap_err();
    assert!(matches!(err, Error::RemoteLoad { cause: LoadCause::SlotMissing, .. }));
}

#[tokio::test]
async fn test_unknown_entry_is_a_load_error() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "who-knows");
    let client = client(&fetcher);

    let err = client.request_export("RemoteModuleFoo", "./action").await.unwrap_err();
    assert!(matches!(err, Error::RemoteLoad { cause: LoadCause::Execute(_), .. }));
}

#[tokio::test]
async fn test_missing_shared_dependency() {
    let fetcher = MockFetcher::new().serve(BAZ_URL, "baz");
    let client = client(&fetcher);

    let err = client.request_export("RemoteModuleBaz", "./action").await.unwrap_err();
    assert!(matches!(
        err,
        Error::SharedDependencyMissing { name, .. } if name == "lodash/toUpper"
    ));
}

// --- Failure isolation and retry ---

#[tokio::test]
async fn test_failed_remote_does_not_affect_others() {
    let fetcher = MockFetcher::new()
        .serve(FOO_URL, "foo")
        .fail(BAR_URL, fetch::Error::Unreachable("connection refused".into()));
    let client = client(&fetcher);

    let err = client.request_export("RemoteModuleBar", "./action").await.unwrap_err();
    assert!(matches!(err, Error::RemoteLoad { .. }));
    assert_eq!(client.load_state(&RemoteId::from("RemoteModuleBar")), LoadState::Failed);

    let action = client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    assert_eq!(greeting(&action), "Remote foo says hello");
}

#[tokio::test]
async fn test_failed_remote_retries_only_on_request() {
    let fetcher = MockFetcher::new().fail(BAR_URL, fetch::Error::Timeout);
    let client = client(&fetcher);
    let bar = RemoteId::from("RemoteModuleBar");

    client.request_export("RemoteModuleBar", "./action").await.unwrap_err();
    assert_eq!(fetcher.hits(BAR_URL), 1);
    assert!(client.loader().last_error(&bar).is_some());

    // Nothing retries behind the caller's back.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.hits(BAR_URL), 1);

    // The bundle comes back; asking again fetches again.
    let fetcher = fetcher.serve(BAR_URL, "bar");
    let action = client.request_export("RemoteModuleBar", "./action").await.unwrap();
    assert_eq!(greeting(&action), "Remote bar says hello");
    assert_eq!(fetcher.hits(BAR_URL), 2);
    assert_eq!(client.load_state(&bar), LoadState::Loaded);
}

// --- Configuration ---

#[tokio::test]
async fn test_base_url_change_after_load_has_no_effect() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "foo");
    let client = client(&fetcher);
    let foo = RemoteId::from("RemoteModuleFoo");

    let first = client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    assert_eq!(
        client.registry().set_base_url(&foo, "http://elsewhere").unwrap(),
        Update::IgnoredFrozen
    );

    let second = client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    assert_eq!(greeting(&first), greeting(&second));
    assert_eq!(fetcher.hits(FOO_URL), 1);
    assert_eq!(fetcher.hits("http://elsewhere/moduleEntry.wasm"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_base_url_change_during_load_is_ignored() {
    let fetcher = MockFetcher::new()
        .serve_after(FOO_URL, "foo", Duration::from_millis(100))
        .serve("http://elsewhere/moduleEntry.wasm", "bar");
    let client = Arc::new(client(&fetcher));
    let foo = RemoteId::from("RemoteModuleFoo");

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.request_export("RemoteModuleFoo", "./action").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.load_state(&foo), LoadState::Loading);

    assert_eq!(
        client.registry().set_base_url(&foo, "http://elsewhere").unwrap(),
        Update::IgnoredFrozen
    );

    let action = pending.await.unwrap().unwrap();
    assert_eq!(greeting(&action), "Remote foo says hello");
    assert_eq!(fetcher.hits(FOO_URL), 1);
    assert_eq!(fetcher.hits("http://elsewhere/moduleEntry.wasm"), 0);
    assert_eq!(client.registry().resolve(&foo).unwrap().entry_url(), FOO_URL);
}

#[tokio::test]
async fn test_base_url_change_before_load_is_used() {
    let fetcher = MockFetcher::new().serve("http://cdn/foo/moduleEntry.wasm", "foo");
    let client = client(&fetcher);

    client
        .registry()
        .set_base_url(&RemoteId::from("RemoteModuleFoo"), "http://cdn/foo")
        .unwrap();
    client.request_export("RemoteModuleFoo", "./action").await.unwrap();

    assert_eq!(fetcher.hits("http://cdn/foo/moduleEntry.wasm"), 1);
    assert_eq!(fetcher.hits(FOO_URL), 0);
}

// --- Share scope across host and remotes ---

#[tokio::test]
async fn test_host_and_remote_share_one_instance() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "foo").serve(BAZ_URL, "baz");
    let client = client(&fetcher);

    let host = client
        .share_scope()
        .declare("lodash/toUpper", || Module::new("host-bundled".to_string()), true)
        .unwrap();

    client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    client.request_export("RemoteModuleBaz", "./action").await.unwrap();

    let resolved = client.share_scope().resolve("lodash/toUpper").unwrap();
    assert!(resolved.ptr_eq(&host));
    assert_eq!(resolved.downcast_ref::<String>().unwrap(), "host-bundled");
}

#[tokio::test]
async fn test_remote_declared_dependency_satisfies_later_remote() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "foo").serve(BAZ_URL, "baz");
    let client = client(&fetcher);

    // Foo bundles the dependency lazily; Baz only requires it.
    client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    client.request_export("RemoteModuleBaz", "./action").await.unwrap();

    let resolved = client.share_scope().resolve("lodash/toUpper").unwrap();
    assert_eq!(resolved.downcast_ref::<String>().unwrap(), "foo-bundled");
}

// --- Timeouts ---

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_cancel_the_load() {
    let fetcher = MockFetcher::new().serve_after(FOO_URL, "foo", Duration::from_secs(5));
    let client = client(&fetcher);

    let err = client
        .request_export_timeout("RemoteModuleFoo", "./action", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(client.load_state(&RemoteId::from("RemoteModuleFoo")), LoadState::Loading);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.load_state(&RemoteId::from("RemoteModuleFoo")), LoadState::Loaded);

    client.request_export("RemoteModuleFoo", "./action").await.unwrap();
    assert_eq!(fetcher.hits(FOO_URL), 1);
}

// --- Orchestrator ---

#[tokio::test(start_paused = true)]
async fn test_orchestrator_orders_by_step_not_by_fetch_time() {
    let fetcher = MockFetcher::new()
        .serve_after(FOO_URL, "foo", Duration::from_millis(300))
        .serve_after(BAR_URL, "bar", Duration::from_millis(10))
        .serve_after(BAZ_URL, "baz", Duration::from_millis(100));
    let client = Arc::new(client(&fetcher));
    client
        .share_scope()
        .declare("lodash/toUpper", || Module::new("host".to_string()), true);

    let mut orchestrator = Orchestrator::new(client.clone()).steps([
        Step::new("RemoteModuleFoo", "./action", Duration::ZERO),
        Step::new("RemoteModuleBar", "./action", Duration::ZERO),
        Step::new("RemoteModuleBaz", "./action", Duration::ZERO),
    ]);
    let mut events = orchestrator.subscribe();
    assert_eq!(orchestrator.phase(), Phase::Idle);

    let outcomes = orchestrator.run().await;
    assert_eq!(orchestrator.phase(), Phase::Finished);

    let order: Vec<&str> = outcomes.iter().map(|o| o.remote.as_str()).collect();
    assert_eq!(order, vec!["RemoteModuleFoo", "RemoteModuleBar", "RemoteModuleBaz"]);

    let mut streamed = Vec::new();
    while let Some(outcome) = events.recv().await {
        streamed.push(outcome.index);
    }
    assert_eq!(streamed, vec![0, 1, 2]);

    for outcome in &outcomes {
        assert!(outcome.result.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_waits_between_steps() {
    let fetcher = MockFetcher::new().serve(FOO_URL, "foo").serve(BAR_URL, "bar");
    let client = Arc::new(client(&fetcher));

    let started = tokio::time::Instant::now();
    let mut orchestrator = Orchestrator::new(client.clone())
        .step(Step::new("RemoteModuleFoo", "./action", Duration::from_millis(2000)))
        .step(Step::new("RemoteModuleBar", "./action", Duration::from_millis(1000)));

    let handle = tokio::spawn(async move { orchestrator.run().await });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(fetcher.hits(FOO_URL), 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(fetcher.hits(FOO_URL), 1);
    assert_eq!(fetcher.hits(BAR_URL), 0);

    let outcomes = handle.await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(fetcher.hits(BAR_URL), 1);
    assert!(started.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_phase_is_observable_while_running() {
    let fetcher = MockFetcher::new()
        .serve(FOO_URL, "foo")
        .serve_after(BAR_URL, "bar", Duration::from_millis(500));
    let client = Arc::new(client(&fetcher));

    let orchestrator = Orchestrator::new(client.clone())
        .step(Step::new("RemoteModuleFoo", "./action", Duration::from_millis(2000)))
        .step(Step::new("RemoteModuleBar", "./action", Duration::ZERO));
    let phase = orchestrator.subscribe_phase();
    assert_eq!(*phase.borrow(), Phase::Idle);

    let mut orchestrator = orchestrator;
    let handle = tokio::spawn(async move { orchestrator.run().await });

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(*phase.borrow(), Phase::Waiting(0));
    assert_eq!(fetcher.hits(FOO_URL), 0);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(*phase.borrow(), Phase::Requesting(1));
    assert_eq!(fetcher.hits(BAR_URL), 1);

    let outcomes = handle.await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(*phase.borrow(), Phase::Finished);
}

#[tokio::test]
async fn test_orchestrator_continues_past_failures() {
    let fetcher = MockFetcher::new()
        .serve(FOO_URL, "foo")
        .fail(BAR_URL, fetch::Error::Unreachable("down".into()))
        .serve(BAZ_URL, "baz");
    let client = Arc::new(client(&fetcher));

    let outcomes = Orchestrator::new(client.clone())
        .steps([
            Step::new("RemoteModuleFoo", "./action", Duration::ZERO),
            Step::new("RemoteModuleBar", "./action", Duration::ZERO),
            Step::new("RemoteModuleBaz", "./action", Duration::ZERO),
        ])
        .run()
        .await;

    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(Error::RemoteLoad { .. })));
    // Foo declared the shared dependency Baz requires.
    assert!(outcomes[2].result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_delay_does_not_change_loaded_set() {
    let states = |client: &FederationClient| {
        ["RemoteModuleFoo", "RemoteModuleBar", "RemoteModuleBaz"]
            .map(|id| client.load_state(&RemoteId::from(id)))
    };

    let mut results = Vec::new();
    for delay in [Duration::ZERO, Duration::from_millis(1000)] {
        let fetcher = MockFetcher::new()
            .serve(FOO_URL, "foo")
            .serve(BAR_URL, "bar")
            .serve(BAZ_URL, "baz");
        let client = Arc::new(client(&fetcher));
        Orchestrator::new(client.clone())
            .steps([
                Step::new("RemoteModuleFoo", "./action", delay),
                Step::new("RemoteModuleBar", "./action", delay),
                Step::new("RemoteModuleBaz", "./action", delay),
            ])
            .run()
            .await;
        results.push(states(client.as_ref()));
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], [LoadState::Loaded; 3]);
}
