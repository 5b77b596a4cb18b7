//! Handler and middleware contracts.
//!
//! Everything the dispatcher resolves from the locator is declared
//! here:
//!
//! - [`RequestHandler`] / [`StreamHandler`] / [`NotificationHandler`] -
//!   terminal handlers, one per message type (notifications: any number)
//! - [`PreProcessor`] / [`PostProcessor`] - observe-only hooks around
//!   the terminal handler
//! - [`Behavior`] / [`StreamBehavior`] - onion middleware wrapping the
//!   handler call; may short-circuit by not invoking [`Next`]
//! - [`FaultHandler`] / [`StreamFaultHandler`] / [`FaultAction`] -
//!   typed failure recovery and side effects (see [`recovery`])
//!
//! # Example
//!
//! ```ignore
//! use courier::{CancellationToken, HandlerResult, Request, RequestHandler};
//!
//! struct Ping {
//!     message: String,
//! }
//!
//! impl Request for Ping {
//!     type Response = String;
//! }
//!
//! struct PingHandler;
//!
//! #[courier::async_trait]
//! impl RequestHandler<Ping> for PingHandler {
//!     async fn handle(&self, request: &Ping, _token: &CancellationToken) -> HandlerResult<String> {
//!         Ok(format!("PONG: {}", request.message))
//!     }
//! }
//! ```

mod recovery;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::{FaultBox, HandlerResult};
use crate::message::{Notification, Request, StreamRequest};

pub use recovery::{
    FaultAction, FaultHandler, RecoveryState, StreamFaultHandler, StreamRecoveryState,
};

/// A lazy stream of dispatch items; faults travel as `Err` elements.
pub type ItemStream<T> = BoxStream<'static, Result<T, FaultBox>>;

/// Terminal handler for a [`Request`]. Exactly one per message type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    /// Produce the response for `request`.
    async fn handle(&self, request: &R, token: &CancellationToken) -> HandlerResult<R::Response>;
}

/// Terminal handler for a [`StreamRequest`]. Exactly one per message type.
///
/// The returned stream is lazy; it must observe `token` itself if it
/// wants to stop early on cancellation.
pub trait StreamHandler<R: StreamRequest>: Send + Sync {
    /// Produce the item stream for `request`.
    fn handle(&self, request: Arc<R>, token: CancellationToken) -> ItemStream<R::Item>;
}

/// Handler for a published [`Notification`]. Zero or more per type.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync {
    /// React to `notification`.
    async fn handle(&self, notification: &N, token: &CancellationToken) -> HandlerResult<()>;
}

/// Observe-only hook that runs before the middleware chain.
///
/// Registered per message type and shared by the request and stream
/// paths. A failing pre-processor aborts the dispatch and is routed
/// through fault recovery like any other failure.
#[async_trait]
pub trait PreProcessor<M: Send + Sync + 'static>: Send + Sync {
    /// Observe `message` before the pipeline runs.
    async fn process(&self, message: &M, token: &CancellationToken) -> HandlerResult<()>;
}

/// Observe-only hook that runs after the terminal handler succeeded.
///
/// Request path only; a short-circuiting middleware skips it.
#[async_trait]
pub trait PostProcessor<R: Request>: Send + Sync {
    /// Observe `request` and the produced `response`.
    async fn process(
        &self,
        request: &R,
        response: &R::Response,
        token: &CancellationToken,
    ) -> HandlerResult<()>;
}

/// The remainder of the request pipeline, handed to a [`Behavior`].
///
/// A behavior short-circuits by returning without calling [`Next::run`];
/// in that case neither the inner behaviors, the terminal handler, nor
/// the post-processors execute.
pub struct Next<'a, T> {
    inner: Box<dyn FnOnce() -> BoxFuture<'a, HandlerResult<T>> + Send + 'a>,
}

impl<'a, T> Next<'a, T> {
    pub(crate) fn new(
        inner: Box<dyn FnOnce() -> BoxFuture<'a, HandlerResult<T>> + Send + 'a>,
    ) -> Self {
        Self { inner }
    }

    /// Run the rest of the pipeline.
    pub async fn run(self) -> HandlerResult<T> {
        (self.inner)().await
    }
}

/// Onion middleware around a request dispatch.
///
/// Behaviors nest in registration order: the first registered is the
/// outermost. Code before `next.run()` happens before the handler, code
/// after happens after.
#[async_trait]
pub trait Behavior<R: Request>: Send + Sync {
    /// Wrap the rest of the pipeline.
    async fn handle(
        &self,
        request: &R,
        next: Next<'_, R::Response>,
        token: &CancellationToken,
    ) -> HandlerResult<R::Response>;
}

/// The remainder of the stream pipeline, handed to a [`StreamBehavior`].
pub struct StreamNext<T> {
    inner: Box<dyn FnOnce() -> ItemStream<T> + Send>,
}

impl<T> StreamNext<T> {
    pub(crate) fn new(inner: Box<dyn FnOnce() -> ItemStream<T> + Send>) -> Self {
        Self { inner }
    }

    /// Build the rest of the pipeline's stream.
    pub fn stream(self) -> ItemStream<T> {
        (self.inner)()
    }
}

/// Onion middleware around a stream dispatch.
///
/// A stream behavior returns the stream the consumer will iterate; it
/// may wrap, transform, or replace the stream produced by
/// [`StreamNext::stream`], or short-circuit by never calling it.
pub trait StreamBehavior<R: StreamRequest>: Send + Sync {
    /// Wrap the rest of the stream pipeline.
    fn handle(
        &self,
        request: Arc<R>,
        next: StreamNext<R::Item>,
        token: CancellationToken,
    ) -> ItemStream<R::Item>;
}
