//! Scoped fixture behaviour against the in-memory runtime.

mod common;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use stevedore::container::testing::{RuntimeCall, ScriptedRuntime};
use stevedore::container::{
    Container, ContainerBuilder, ContainerError, ContainerStatus, Fixture, PortSpec, StaticImage,
    WaitOptions, scoped,
};

fn builder(runtime: &Arc<ScriptedRuntime>) -> ContainerBuilder {
    Container::builder(Arc::new(StaticImage::new("redis:7-alpine")))
        .client(runtime.clone())
        .startup_poll_interval(Duration::from_millis(5))
}

fn teardown_calls(runtime: &ScriptedRuntime) -> Vec<&'static str> {
    runtime
        .call_names()
        .into_iter()
        .filter(|name| *name == "kill" || *name == "remove")
        .collect()
}

/// Error type of a caller that wraps container errors in its own enum.
#[derive(Debug)]
enum AppError {
    Container(ContainerError),
    Rejected(&'static str),
}

impl From<ContainerError> for AppError {
    fn from(e: ContainerError) -> Self {
        AppError::Container(e)
    }
}

#[tokio::test]
async fn test_body_error_propagates_after_kill_and_remove() {
    common::init_tracing();
    let runtime = Arc::new(ScriptedRuntime::new());

    let result = Fixture::new(builder(&runtime))
        .run(async |container| -> anyhow::Result<()> {
            assert!(container.id().is_ok());
            anyhow::bail!("query returned no rows")
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "query returned no rows");
    assert_eq!(teardown_calls(&runtime), vec!["kill", "remove"]);
    assert!(runtime.is_removed());
}

#[tokio::test]
async fn test_custom_error_type_in_body() {
    common::init_tracing();
    let runtime = Arc::new(ScriptedRuntime::new());
    let container = builder(&runtime).build().unwrap();

    let result: Result<(), AppError> = scoped(
        container,
        WaitOptions::default(),
        async |_container| -> Result<(), AppError> { Err(AppError::Rejected("bad fixture data")) },
    )
    .await;

    assert!(matches!(result, Err(AppError::Rejected("bad fixture data"))));
    assert_eq!(teardown_calls(&runtime), vec!["kill", "remove"]);
}

#[tokio::test]
async fn test_panic_in_body_still_tears_down() {
    common::init_tracing();
    let runtime = Arc::new(ScriptedRuntime::new());
    let fixture = Fixture::new(builder(&runtime));

    let outcome = AssertUnwindSafe(fixture.run(async |_container| -> anyhow::Result<()> {
        panic!("assertion inside fixture");
    }))
    .catch_unwind()
    .await;

    let panic = outcome.unwrap_err();
    assert_eq!(
        panic.downcast_ref::<&str>().copied(),
        Some("assertion inside fixture")
    );
    assert_eq!(teardown_calls(&runtime), vec!["kill", "remove"]);
}

#[tokio::test]
async fn test_wait_failure_tears_down_without_entering_body() {
    common::init_tracing();
    let runtime = Arc::new(ScriptedRuntime::new());
    let closed_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let wait = WaitOptions::default()
        .ports([PortSpec::tcp(closed_port)])
        .max_wait(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(20));
    let mut entered = false;

    let result = Fixture::new(builder(&runtime))
        .wait(wait)
        .run(async |_container| -> Result<(), AppError> {
            entered = true;
            Ok(())
        })
        .await;

    assert!(matches!(
        result,
        Err(AppError::Container(ContainerError::Timeout { .. }))
    ));
    assert!(!entered);
    assert_eq!(teardown_calls(&runtime), vec!["kill", "remove"]);
}

#[tokio::test]
async fn test_container_exit_during_startup() {
    common::init_tracing();
    let runtime = Arc::new(
        ScriptedRuntime::new().statuses([ContainerStatus::Created, ContainerStatus::Exited]),
    );

    let result = Fixture::new(builder(&runtime))
        .run(async |_container| -> anyhow::Result<()> { Ok(()) })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ContainerError>(),
        Some(ContainerError::StoppedPrematurely { .. })
    ));
    // Already exited: kill is answered with "already stopped" and swallowed
    assert_eq!(teardown_calls(&runtime), vec!["kill", "remove"]);
}

#[tokio::test]
async fn test_success_returns_body_value_and_cleans_up() {
    common::init_tracing();
    let runtime = Arc::new(ScriptedRuntime::new().exposed_ports(["6379/tcp"]));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let ports = Fixture::new(builder(&runtime))
        .wait(WaitOptions::default().ports([PortSpec::tcp(port)]))
        .run(async |container| -> anyhow::Result<Vec<PortSpec>> { Ok(container.ports()?) })
        .await
        .unwrap();

    assert_eq!(ports, vec![PortSpec::tcp(6379)]);
    let calls = runtime.calls();
    assert!(matches!(calls.first(), Some(RuntimeCall::Pull(image)) if image == "redis:7-alpine"));
    assert!(matches!(calls.last(), Some(RuntimeCall::Remove(_))));
}
