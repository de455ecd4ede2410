//! Handler registry: which handler answers requests on which channel.

use crate::error::ActivatorError;
use async_trait::async_trait;
use cr_01_correlation_engine::{HandlerError, RequestHandler};
use shared_types::{Call, ChannelName, Message, MessageBody};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Adapts an async `Fn(R) -> Result<R::Reply, HandlerError>` to a
/// [`RequestHandler`] that decodes the request and encodes the reply.
pub struct TypedHandler<R, F> {
    handler: F,
    _request: PhantomData<fn(R)>,
}

impl<R, F> TypedHandler<R, F> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R, F, Fut> RequestHandler for TypedHandler<R, F>
where
    R: Call,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Reply, HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: &Message) -> Result<MessageBody, HandlerError> {
        let typed: R = request.decode().map_err(HandlerError::Decode)?;
        let reply = (self.handler)(typed).await?;
        MessageBody::encode(&reply).map_err(HandlerError::Encode)
    }
}

/// Handlers keyed by the channel their requests arrive on.
///
/// The registry is itself a [`RequestHandler`] that routes by the
/// request's channel.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ChannelName, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for requests of type `R` on `channel`.
    pub fn register<R, F, Fut>(
        &mut self,
        channel: impl Into<ChannelName>,
        handler: F,
    ) -> Result<(), ActivatorError>
    where
        R: Call,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Reply, HandlerError>> + Send + 'static,
    {
        self.register_handler(channel, Arc::new(TypedHandler::<R, F>::new(handler)))
    }

    /// Register a message-level handler for `channel`.
    pub fn register_handler(
        &mut self,
        channel: impl Into<ChannelName>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), ActivatorError> {
        let channel = channel.into();
        if self.handlers.contains_key(&channel) {
            return Err(ActivatorError::DuplicateHandler(channel));
        }
        debug!(channel = %channel, "Registered request handler");
        self.handlers.insert(channel, handler);
        Ok(())
    }

    pub fn handles(&self, channel: &ChannelName) -> bool {
        self.handlers.contains_key(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelName> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl RequestHandler for HandlerRegistry {
    async fn handle(&self, request: &Message) -> Result<MessageBody, HandlerError> {
        let handler = self
            .handlers
            .get(request.channel())
            .ok_or_else(|| HandlerError::NoHandler(request.channel().to_string()))?;
        handler.handle(request).await
    }
}
