//! # courier
//!
//! In-process message dispatch: typed requests, streaming requests and
//! notifications routed from sender to handler through a composable
//! middleware pipeline, with typed fault recovery.
//!
//! ## Architecture
//!
//! - **Messages** ([`Request`], [`StreamRequest`], [`Notification`])
//!   are plain types carrying a marker trait.
//! - **Handlers and middleware** are resolved from a [`Locator`] on
//!   every dispatch; the built-in [`Registry`] covers the common case.
//! - **Dispatch** goes through a per-message-type invoker cache, so the
//!   warm path is a map read plus a direct call.
//! - **Failures** travel as [`FaultBox`] values; fault handlers can
//!   recover them (including mid-stream, by swapping in a replacement
//!   stream) and fault actions observe what stays unrecovered.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::{async_trait, CancellationToken, Dispatcher, HandlerResult, Registry, Request, RequestHandler};
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
//! #[async_trait]
//! impl RequestHandler<Ping> for PingHandler {
//!     async fn handle(&self, request: &Ping, _token: &CancellationToken) -> HandlerResult<String> {
//!         Ok(format!("PONG: {}", request.message))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> HandlerResult<()> {
//!     let mut registry = Registry::new();
//!     registry.request_handler(PingHandler);
//!
//!     let dispatcher = Dispatcher::new(Arc::new(registry));
//!     let pong = dispatcher
//!         .send(&Ping { message: "hello".into() }, &CancellationToken::new())
//!         .await?;
//!     assert_eq!(pong, "PONG: hello");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handler;
pub mod locator;
pub mod message;
pub mod publish;

mod dispatch;
mod dispatcher;
mod executor;
mod pipeline;
mod recovery;
mod stream;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{
    AggregateFault, Cancelled, DispatchError, Fault, FaultBox, HandlerResult,
};
pub use handler::{
    Behavior, FaultAction, FaultHandler, ItemStream, Next, NotificationHandler, PostProcessor,
    PreProcessor, RecoveryState, RequestHandler, StreamBehavior, StreamFaultHandler,
    StreamHandler, StreamNext, StreamRecoveryState,
};
pub use locator::{Locator, Registry, Service, ServiceKey};
pub use message::{Notification, Request, StreamRequest};
pub use publish::{HandlerCall, ParallelPublish, PublishStrategy, SequentialPublish};
pub use stream::DispatchStream;

// Re-exported so downstream code does not need direct dependencies for
// the types that appear in every handler signature.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
