//! # Races
//!
//! Replies that arrive before `publish` returns, after the deadline, or
//! right on it.

use super::fixtures::{client_config, eventually, producer, request_subscription};
use async_trait::async_trait;
use cr_01_correlation_engine::{CallError, CorrelationEngine, EngineConfig, Requester};
use cr_02_service_activator::{HandlerRegistry, ServiceActivator};
use futures::future::join_all;
use greetings_runtime::{handler, GreetingRequest, REPLY_CHANNEL};
use shared_bus::{BusError, InMemoryBroker, MessageProducer, Subscription};
use shared_types::{ChannelName, CorrelationId, Message, MessageBody};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

/// Answers every request from inside `publish`, before it returns.
#[derive(Default)]
struct InlineResponder {
    client: OnceLock<Weak<CorrelationEngine>>,
}

#[async_trait]
impl MessageProducer for InlineResponder {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        let request: GreetingRequest = message
            .decode()
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;
        let reply = handler::greet(request)
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;
        let reply_to = message
            .reply_to()
            .cloned()
            .ok_or_else(|| BusError::PublishFailed("no reply-to".into()))?;
        let body =
            MessageBody::encode(&reply).map_err(|e| BusError::PublishFailed(e.to_string()))?;

        if let Some(client) = self.client.get().and_then(Weak::upgrade) {
            client.on_reply_received(Message::reply(message.correlation_id(), reply_to, body));
        }
        Ok(())
    }
}

/// Greetings server whose handler takes `delay` to answer.
fn start_slow_server(broker: &InMemoryBroker, delay: Duration) -> ServiceActivator {
    let subscription: Subscription = request_subscription();
    let engine = Arc::new(
        CorrelationEngine::new(EngineConfig::default(), Arc::new(broker.clone())).unwrap(),
    );
    let mut handlers = HandlerRegistry::new();
    handlers
        .register(subscription.channel.clone(), move |req: GreetingRequest| async move {
            tokio::time::sleep(delay).await;
            handler::greet(req).await
        })
        .unwrap();
    ServiceActivator::start(engine, Arc::new(handlers), &[subscription], broker).unwrap()
}

#[tokio::test]
async fn test_reply_before_publish_returns() {
    let broker = InMemoryBroker::new();
    let responder = Arc::new(InlineResponder::default());
    let requester = Requester::start(client_config(), responder.clone(), &broker).unwrap();
    responder
        .client
        .set(Arc::downgrade(requester.engine()))
        .unwrap();

    let reply = requester
        .call(
            &GreetingRequest::new("Ian", "en-gb"),
            Some(Duration::from_millis(500)),
        )
        .await
        .unwrap();

    assert_eq!(reply.greeting, "Good morning, Ian");
    assert_eq!(requester.pending_count(), 0);
    assert_eq!(requester.engine().stats().snapshot().completed, 1);
    requester.shutdown().await;
}

#[tokio::test]
async fn test_late_reply_discarded_after_timeout() {
    let broker = InMemoryBroker::new();
    let server = start_slow_server(&broker, Duration::from_millis(150));
    let requester = Requester::start(client_config(), producer(&broker), &broker).unwrap();

    let result = requester
        .call(
            &GreetingRequest::new("Ian", "en-gb"),
            Some(Duration::from_millis(40)),
        )
        .await;
    assert!(matches!(result, Err(CallError::Timeout { .. })));
    assert_eq!(requester.pending_count(), 0);

    // The server still answers; the listener drops the reply
    let engine = Arc::clone(requester.engine());
    eventually(|| engine.stats().snapshot().unmatched == 1).await;

    let stats = engine.stats().snapshot();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(requester.pending_count(), 0);

    let listener = requester.shutdown().await;
    assert_eq!(listener.unmatched, 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_stray_reply_does_not_disturb_call() {
    let broker = InMemoryBroker::new();
    let server = start_slow_server(&broker, Duration::from_millis(60));
    let requester = Requester::start(client_config(), producer(&broker), &broker).unwrap();

    let request = GreetingRequest::new("Ian", "en-gb");
    let call = requester.call(
        &request,
        Some(Duration::from_secs(2)),
    );
    let stray = async {
        let body =
            MessageBody::new("greetings.greeting_reply", br#"{"greeting":"stray"}"#.to_vec());
        broker
            .publish(Message::reply(
                CorrelationId::new(),
                ChannelName::from(REPLY_CHANNEL),
                body,
            ))
            .await
            .unwrap();
    };
    let (reply, ()) = tokio::join!(call, stray);

    assert_eq!(reply.unwrap().greeting, "Good morning, Ian");
    let stats = requester.engine().stats().snapshot();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.unmatched, 1);

    requester.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_replies_racing_deadlines_resolve_once() {
    let broker = InMemoryBroker::new();
    let server = start_slow_server(&broker, Duration::from_millis(15));
    let requester = Requester::start(client_config(), producer(&broker), &broker).unwrap();

    let outcomes = join_all((0..40u64).map(|i| {
        let requester = &requester;
        async move {
            let request = GreetingRequest::new(format!("racer-{i}"), "en-gb");
            requester
                .call(&request, Some(Duration::from_millis(5 + i)))
                .await
        }
    }))
    .await;

    for outcome in &outcomes {
        assert!(matches!(outcome, Ok(_) | Err(CallError::Timeout { .. })));
    }
    assert_eq!(requester.pending_count(), 0);

    let stats = requester.engine().stats().snapshot();
    assert_eq!(stats.registered, 40);
    assert_eq!(stats.completed + stats.timeouts + stats.cancelled, 40);

    requester.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replies_racing_deadlines_across_threads() {
    let broker = InMemoryBroker::new();
    let server = start_slow_server(&broker, Duration::from_millis(10));
    let requester = Arc::new(
        Requester::start(client_config(), producer(&broker), &broker).unwrap(),
    );

    let callers = (0..200u64).map(|i| {
        let requester = Arc::clone(&requester);
        tokio::spawn(async move {
            let request = GreetingRequest::new(format!("racer-{i}"), "en-gb");
            requester
                .call(&request, Some(Duration::from_millis(5 + i % 20)))
                .await
        })
    });
    let outcomes: Vec<_> = join_all(callers)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let answered = outcomes.iter().filter(|o| o.is_ok()).count() as u64;
    for outcome in &outcomes {
        assert!(matches!(outcome, Ok(_) | Err(CallError::Timeout { .. })));
    }
    assert_eq!(requester.pending_count(), 0);

    // Every reply the table handed over reached its caller
    let stats = requester.engine().stats().snapshot();
    assert_eq!(stats.registered, 200);
    assert_eq!(stats.completed, answered);
    assert_eq!(stats.completed + stats.timeouts + stats.cancelled, 200);

    server.shutdown().await;
}
