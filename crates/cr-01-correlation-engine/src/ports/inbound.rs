//! Inbound port for the responder side.

use crate::error::HandlerError;
use async_trait::async_trait;
use shared_types::{Message, MessageBody};
use std::sync::Arc;

/// Turns a request into the body of its reply.
///
/// Implementations never see correlation or routing; the engine copies the
/// correlation id onto the reply and sends it to the request's reply-to
/// channel.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &Message) -> Result<MessageBody, HandlerError>;
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    async fn handle(&self, request: &Message) -> Result<MessageBody, HandlerError> {
        (**self).handle(request).await
    }
}
