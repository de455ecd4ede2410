//! # Greetings End-to-End
//!
//! Client and server over one broker, as the demo binary runs them.

use super::fixtures::{client_config, producer, runtime_config};
use cr_01_correlation_engine::{CallError, Requester};
use futures::future::join_all;
use greetings_runtime::{GreetingRequest, GreetingsRuntime, REQUEST_CHANNEL};
use shared_bus::InMemoryBroker;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_greeting_call_end_to_end() {
    let runtime = GreetingsRuntime::start(runtime_config()).unwrap();

    let started = Instant::now();
    let reply = runtime
        .greet(
            &GreetingRequest::new("Ian", "en-gb"),
            Some(Duration::from_millis(2_000)),
        )
        .await
        .unwrap();

    assert_eq!(reply.greeting, "Good morning, Ian");
    assert!(started.elapsed() < Duration::from_millis(2_000));
    assert_eq!(runtime.requester().pending_count(), 0);

    let stats = runtime.shutdown().await;
    assert_eq!(stats.handled, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_greeting_in_requested_language() {
    let runtime = GreetingsRuntime::start(runtime_config()).unwrap();

    let reply = runtime
        .greet(&GreetingRequest::new("Amélie", "fr-fr"), None)
        .await
        .unwrap();
    assert_eq!(reply.greeting, "Bonjour, Amélie");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_timeout_against_silent_responder() {
    let broker = InMemoryBroker::new();
    let requester = Requester::start(client_config(), producer(&broker), &broker).unwrap();

    let started = Instant::now();
    let result = requester
        .call(
            &GreetingRequest::new("Ian", "en-gb"),
            Some(Duration::from_millis(50)),
        )
        .await;

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(
        result,
        Err(CallError::Timeout { timeout_ms: 50, .. })
    ));
    assert_eq!(requester.pending_count(), 0);
    // The request itself did go out
    assert_eq!(broker.channel_len(&REQUEST_CHANNEL.into()), 1);

    requester.shutdown().await;
}

#[tokio::test]
async fn test_many_concurrent_callers() {
    let runtime = GreetingsRuntime::start(runtime_config()).unwrap();

    let names: Vec<String> = (0..100).map(|i| format!("caller-{i}")).collect();
    let replies = join_all(names.iter().map(|name| {
        let request = GreetingRequest::new(name.clone(), "en-gb");
        let runtime = &runtime;
        async move { runtime.greet(&request, Some(Duration::from_secs(5))).await }
    }))
    .await;

    for (name, reply) in names.iter().zip(replies) {
        assert_eq!(reply.unwrap().greeting, format!("Good morning, {name}"));
    }

    let requests = runtime.broker().messages(&REQUEST_CHANNEL.into());
    let ids: HashSet<_> = requests.iter().map(|m| m.correlation_id()).collect();
    assert_eq!(requests.len(), 100);
    assert_eq!(ids.len(), 100);
    assert_eq!(runtime.requester().pending_count(), 0);

    runtime.shutdown().await;
}
