//! Notification publish strategies.
//!
//! A strategy receives the resolved handler collection as erased
//! callables and decides how to run them. Two strategies are built in;
//! custom ones implement [`PublishStrategy`] and are installed through
//! the dispatcher builder.
//!
//! Notifications do not participate in the pipeline: no processors, no
//! behaviors, no fault recovery. Whatever escapes a handler under the
//! active strategy is what the publisher returns.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};

use crate::error::{AggregateFault, FaultBox, HandlerResult};

/// An erased notification handler invocation.
///
/// Calling the closure produces the handler's future; the strategy
/// decides when to invoke and when to await. The lifetime ties the
/// call to the borrowed notification it closes over.
pub type HandlerCall<'a> = Box<dyn FnOnce() -> BoxFuture<'a, HandlerResult<()>> + Send + 'a>;

/// Runs a notification against its resolved handlers.
#[async_trait]
pub trait PublishStrategy: Send + Sync {
    /// Run every handler call. `handlers` preserves resolution order
    /// and may be empty.
    async fn publish<'a>(&self, handlers: Vec<HandlerCall<'a>>) -> HandlerResult<()>;
}

/// Ordered, fail-fast publishing. The default strategy.
///
/// Handler *i* completes before handler *i + 1* starts; the first
/// failure aborts the loop and propagates, and later handlers do not
/// run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialPublish;

#[async_trait]
impl PublishStrategy for SequentialPublish {
    async fn publish<'a>(&self, handlers: Vec<HandlerCall<'a>>) -> HandlerResult<()> {
        for call in handlers {
            call().await?;
        }
        Ok(())
    }
}

/// Concurrent publishing.
///
/// Every handler future is created before any is awaited, so each
/// handler runs regardless of whether another fails. A single failure
/// propagates as-is; multiple failures aggregate into
/// [`AggregateFault`].
///
/// Fast paths: zero handlers complete immediately; a single handler's
/// future is awaited directly with no aggregation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelPublish;

#[async_trait]
impl PublishStrategy for ParallelPublish {
    async fn publish<'a>(&self, mut handlers: Vec<HandlerCall<'a>>) -> HandlerResult<()> {
        match handlers.len() {
            0 => return Ok(()),
            1 => {
                let call = handlers.remove(0);
                return call().await;
            }
            _ => {}
        }

        let futures: Vec<_> = handlers.into_iter().map(|call| call()).collect();
        let mut faults: Vec<FaultBox> = join_all(futures)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        match faults.len() {
            0 => Ok(()),
            1 => Err(faults.remove(0)),
            _ => Err(AggregateFault::new(faults).into()),
        }
    }
}
