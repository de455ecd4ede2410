//! # Delivery
//!
//! Publish failures, handler failures and requests that wait for a
//! responder to come up.

use super::fixtures::{client_config, eventually, producer, request_subscription, start_server};
use async_trait::async_trait;
use cr_01_correlation_engine::{CallError, Requester};
use cr_02_service_activator::{DEAD_LETTER_REASON_HEADER, ORIGINAL_CHANNEL_HEADER};
use greetings_runtime::{GreetingRequest, REQUEST_CHANNEL};
use shared_bus::{BusError, InMemoryBroker, MessageProducer};
use shared_types::{ChannelName, Message};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Producer whose broker refuses every message.
#[derive(Default)]
struct RefusingProducer {
    attempts: AtomicU32,
}

#[async_trait]
impl MessageProducer for RefusingProducer {
    async fn publish(&self, _message: Message) -> Result<(), BusError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BusError::PublishFailed("partition leader unavailable".into()))
    }
}

#[tokio::test]
async fn test_publish_failure_surfaces_transport_error() {
    let broker = InMemoryBroker::new();
    let refusing = Arc::new(RefusingProducer::default());
    let requester = Requester::start(client_config(), refusing.clone(), &broker).unwrap();

    let result = requester
        .call(
            &GreetingRequest::new("Ian", "en-gb"),
            Some(Duration::from_secs(1)),
        )
        .await;

    match result {
        Err(CallError::Transport { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(source, BusError::PublishFailed(_)));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(refusing.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(requester.pending_count(), 0);
    assert_eq!(requester.engine().stats().snapshot().cancelled, 1);

    requester.shutdown().await;
}

#[tokio::test]
async fn test_failed_request_dead_lettered_and_caller_times_out() {
    let broker = InMemoryBroker::new();
    let dlq = ChannelName::from("Greeting.Request.dlq");
    let server = start_server(
        &broker,
        request_subscription().with_dead_letter_channel(dlq.clone()),
    );
    let requester = Requester::start(client_config(), producer(&broker), &broker).unwrap();

    let result = requester
        .call(
            &GreetingRequest::new("  ", "en-gb"),
            Some(Duration::from_millis(100)),
        )
        .await;
    assert!(matches!(result, Err(CallError::Timeout { .. })));
    assert_eq!(requester.pending_count(), 0);

    eventually(|| broker.channel_len(&dlq) == 1).await;
    let dead = &broker.messages(&dlq)[0];
    assert!(dead.is_request());
    assert_eq!(dead.header(ORIGINAL_CHANNEL_HEADER), Some(REQUEST_CHANNEL));
    assert!(dead.header(DEAD_LETTER_REASON_HEADER).is_some());

    // The responder keeps serving after a failure
    let reply = requester
        .call(
            &GreetingRequest::new("Ian", "de"),
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(reply.greeting, "Guten Morgen, Ian");

    requester.shutdown().await;
    let stats = server.shutdown().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.handled, 1);
}

#[tokio::test]
async fn test_request_waits_for_responder() {
    let broker = InMemoryBroker::new();
    let requester = Requester::start(client_config(), producer(&broker), &broker).unwrap();
    let requests = ChannelName::from(REQUEST_CHANNEL);

    let request = GreetingRequest::new("Ian", "fr");
    let call = requester.call(
        &request,
        Some(Duration::from_secs(2)),
    );
    let late_server = async {
        // Published with nobody consuming the request channel yet
        eventually(|| broker.channel_len(&requests) == 1).await;
        assert_eq!(requester.pending_count(), 1);
        start_server(&broker, request_subscription())
    };
    let (reply, server) = tokio::join!(call, late_server);

    assert_eq!(reply.unwrap().greeting, "Bonjour, Ian");
    assert_eq!(requester.pending_count(), 0);

    server.shutdown().await;
    assert_eq!(
        broker.committed_offset(&requests, &request_subscription().group_id),
        Some(1)
    );
    requester.shutdown().await;
}
