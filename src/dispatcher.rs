//! The dispatch facade.
//!
//! [`Dispatcher`] binds a [`Locator`] and a publish strategy and exposes
//! the four dispatch operations: `send`, `create_stream`, `publish`
//! (void requests are `send` with a `()` response). It holds the warm
//! invoker caches but is otherwise stateless; cloning is cheap and all
//! clones share the caches.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::{CancellationToken, Dispatcher, Registry};
//!
//! let mut registry = Registry::new();
//! registry.request_handler(PingHandler);
//!
//! let dispatcher = Dispatcher::new(Arc::new(registry));
//! let pong = dispatcher.send(&Ping { message: "hello".into() }, &CancellationToken::new()).await?;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::DispatchCaches;
use crate::error::{DispatchError, HandlerResult};
use crate::executor;
use crate::handler::NotificationHandler;
use crate::locator::{resolve_role, role, Locator, ServiceKey};
use crate::message::{Notification, Request, StreamRequest};
use crate::publish::{HandlerCall, PublishStrategy, SequentialPublish};
use crate::stream::DispatchStream;

/// The user-facing dispatch API.
#[derive(Clone)]
pub struct Dispatcher {
    locator: Arc<dyn Locator>,
    publisher: Arc<dyn PublishStrategy>,
    caches: Arc<DispatchCaches>,
}

impl Dispatcher {
    /// Create a dispatcher over `locator` with the default sequential
    /// publish strategy.
    pub fn new(locator: Arc<dyn Locator>) -> Self {
        Self {
            locator,
            publisher: Arc::new(SequentialPublish),
            caches: Arc::new(DispatchCaches::new()),
        }
    }

    /// Start building a dispatcher with explicit configuration.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatch a request to its terminal handler and await the
    /// response.
    ///
    /// For a void request (`Response = ()`) the returned unit is simply
    /// discarded at the call site.
    pub async fn send<R: Request>(
        &self,
        request: &R,
        token: &CancellationToken,
    ) -> HandlerResult<R::Response> {
        executor::request::send(&self.locator, &self.caches, request, token).await
    }

    /// Dispatch a stream request, returning the lazy item stream.
    ///
    /// Nothing resolves or runs until the stream is first polled; the
    /// consumer may attach its own token with
    /// [`DispatchStream::with_cancellation`] before iterating.
    pub fn create_stream<R: StreamRequest>(
        &self,
        request: R,
        token: CancellationToken,
    ) -> DispatchStream<R::Item> {
        executor::stream::create(self.locator.clone(), self.caches.clone(), request, token)
    }

    /// Publish a notification to all registered handlers using the
    /// active publish strategy.
    pub async fn publish<N: Notification>(
        &self,
        notification: &N,
        token: &CancellationToken,
    ) -> HandlerResult<()> {
        let handlers: Vec<Arc<dyn NotificationHandler<N>>> = resolve_role(
            self.locator.as_ref(),
            ServiceKey::of::<dyn NotificationHandler<N>>(),
            role::NOTIFICATION_HANDLER,
        )?;

        let calls: Vec<HandlerCall<'_>> = handlers
            .into_iter()
            .map(|handler| {
                let token = token.clone();
                let call: HandlerCall<'_> = Box::new(move || {
                    Box::pin(async move { handler.handle(notification, &token).await })
                });
                call
            })
            .collect();

        self.publisher.publish(calls).await
    }
}

/// Fluent configuration for [`Dispatcher`].
pub struct DispatcherBuilder {
    locator: Option<Arc<dyn Locator>>,
    publisher: Arc<dyn PublishStrategy>,
}

impl DispatcherBuilder {
    /// Create a builder with the sequential publish strategy.
    pub fn new() -> Self {
        Self {
            locator: None,
            publisher: Arc::new(SequentialPublish),
        }
    }

    /// Set the locator the dispatcher resolves collaborators from.
    pub fn locator(mut self, locator: Arc<dyn Locator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Set the notification publish strategy.
    pub fn publisher<P: PublishStrategy + 'static>(mut self, publisher: P) -> Self {
        self.publisher = Arc::new(publisher);
        self
    }

    /// Build the dispatcher.
    ///
    /// Fails with [`DispatchError::InvalidArgument`] when no locator
    /// was supplied.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let locator = self
            .locator
            .ok_or(DispatchError::InvalidArgument("a locator is required"))?;
        Ok(Dispatcher {
            locator,
            publisher: self.publisher,
            caches: Arc::new(DispatchCaches::new()),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::handler::RequestHandler;
    use crate::locator::Registry;
    use crate::publish::ParallelPublish;

    use super::*;

    struct Ping;

    impl Request for Ping {
        type Response = u32;
    }

    struct PingHandler;

    #[async_trait]
    impl RequestHandler<Ping> for PingHandler {
        async fn handle(&self, _: &Ping, _: &CancellationToken) -> HandlerResult<u32> {
            Ok(7)
        }
    }

    #[test]
    fn test_builder_requires_locator() {
        let err = Dispatcher::builder().publisher(ParallelPublish).build();
        assert!(matches!(err, Err(DispatchError::InvalidArgument(_))));
    }

    #[test]
    fn test_builder_with_locator() {
        let dispatcher = Dispatcher::builder()
            .locator(Arc::new(Registry::new()))
            .build()
            .unwrap();
        let _ = dispatcher.clone();
    }

    #[tokio::test]
    async fn test_warm_path_builds_entry_once() {
        let mut registry = Registry::new();
        registry.request_handler::<Ping, _>(PingHandler);
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let token = CancellationToken::new();

        assert_eq!(dispatcher.caches.entry_builds(), 0);

        for _ in 0..5 {
            let response = dispatcher.send(&Ping, &token).await.unwrap();
            assert_eq!(response, 7);
        }

        // One cold build, then pure cache reads.
        assert_eq!(dispatcher.caches.entry_builds(), 1);
    }
}
