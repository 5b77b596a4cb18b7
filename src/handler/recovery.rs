//! Fault recovery contracts.
//!
//! When any pipeline stage fails, the fault processor walks the fault's
//! lineage (concrete kind, declared ancestors, universal tier) and
//! invokes the registered [`FaultHandler`]s with a mutable state object.
//! The first handler that marks the state handled decides the outcome;
//! [`FaultAction`]s run only when no handler recovered, and cannot
//! prevent the original fault from propagating.

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Fault, FaultBox, HandlerResult};
use crate::handler::ItemStream;
use crate::message::{Request, StreamRequest};

/// Mutable recovery state for a failed request dispatch.
///
/// Passed to every [`FaultHandler`] consulted for a failure. Calling
/// [`set_handled`](Self::set_handled) stops the walk; the supplied
/// value becomes the dispatch result and the caller never observes the
/// fault.
pub struct RecoveryState<T> {
    value: Option<T>,
}

impl<T> RecoveryState<T> {
    pub(crate) fn new() -> Self {
        Self { value: None }
    }

    /// Mark the failure handled, supplying the recovery response.
    pub fn set_handled(&mut self, value: T) {
        self.value = Some(value);
    }

    /// True once a handler has marked the failure handled.
    pub fn is_handled(&self) -> bool {
        self.value.is_some()
    }

    pub(crate) fn take(&mut self) -> Option<T> {
        self.value.take()
    }
}

/// Mutable recovery state for a failed stream dispatch.
///
/// Marking the state handled supplies a replacement stream; iteration
/// continues with the replacement's first element and the consumer
/// never observes the fault.
pub struct StreamRecoveryState<T> {
    replacement: Option<ItemStream<T>>,
}

impl<T: Send + 'static> StreamRecoveryState<T> {
    pub(crate) fn new() -> Self {
        Self { replacement: None }
    }

    /// Mark the failure handled, supplying the replacement stream.
    pub fn set_handled_with_stream<S>(&mut self, stream: S)
    where
        S: Stream<Item = Result<T, FaultBox>> + Send + 'static,
    {
        self.replacement = Some(Box::pin(stream));
    }

    /// Mark the failure handled with a fixed sequence of items.
    pub fn set_handled_with_items<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        self.replacement = Some(Box::pin(futures::stream::iter(
            items.into_iter().map(Ok),
        )));
    }

    /// True once a handler has marked the failure handled.
    pub fn is_handled(&self) -> bool {
        self.replacement.is_some()
    }

    pub(crate) fn take(&mut self) -> Option<ItemStream<T>> {
        self.replacement.take()
    }
}

/// Typed recovery for a failed request dispatch.
///
/// Registered per `(message type, fault kind)`. Handlers for the
/// concrete kind run before handlers for declared ancestors, which run
/// before universal handlers; within a tier, resolution order decides.
/// A handler that fails itself propagates its own fault immediately,
/// replacing the original.
#[async_trait]
pub trait FaultHandler<R: Request>: Send + Sync {
    /// Inspect the fault and optionally mark it handled.
    async fn handle(
        &self,
        request: &R,
        fault: &dyn Fault,
        state: &mut RecoveryState<R::Response>,
        token: &CancellationToken,
    ) -> HandlerResult<()>;
}

/// Typed recovery for a failed stream dispatch.
#[async_trait]
pub trait StreamFaultHandler<R: StreamRequest>: Send + Sync {
    /// Inspect the fault and optionally supply a replacement stream.
    async fn handle(
        &self,
        request: &R,
        fault: &dyn Fault,
        state: &mut StreamRecoveryState<R::Item>,
        token: &CancellationToken,
    ) -> HandlerResult<()>;
}

/// Side effect for an unrecovered failure.
///
/// Actions run only when no handler marked the fault handled. They
/// observe the fault but cannot recover it; an action that fails
/// propagates its own fault, replacing the original, and the remaining
/// actions do not run.
#[async_trait]
pub trait FaultAction<M: Send + Sync + 'static>: Send + Sync {
    /// Observe the unrecovered fault.
    async fn execute(
        &self,
        message: &M,
        fault: &dyn Fault,
        token: &CancellationToken,
    ) -> HandlerResult<()>;
}
