//! In-crate service registry.
//!
//! [`Registry`] is the built-in [`Locator`]: collaborators are
//! registered up front with the typed methods below, then the registry
//! is frozen behind an `Arc` and shared with the dispatcher. Because
//! nothing mutates after construction, resolution is plain map reads
//! and safe under any amount of concurrency.
//!
//! Registration semantics:
//!
//! - terminal handlers (request, stream): **first wins** - a second
//!   registration for the same message type is silently ignored;
//! - everything else: **add-distinct** - registering the same concrete
//!   type twice under one key collapses to a single instance.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//! registry
//!     .request_handler(PingHandler)
//!     .behavior::<Ping, _>(TimingBehavior)
//!     .fault_handler::<PingFault, _, _>(PingRecovery);
//!
//! let dispatcher = Dispatcher::new(Arc::new(registry));
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Fault;
use crate::handler::{
    Behavior, FaultAction, FaultHandler, NotificationHandler, PostProcessor, PreProcessor,
    RequestHandler, StreamBehavior, StreamFaultHandler, StreamHandler,
};
use crate::message::{Notification, Request, StreamRequest};
use crate::recovery::AnyKind;

use super::{Locator, Service, ServiceKey};

struct Registered {
    concrete: TypeId,
    instance: Service,
}

/// The built-in locator with typed registration methods.
#[derive(Default)]
pub struct Registry {
    services: HashMap<ServiceKey, Vec<Registered>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the terminal handler for request type `R`. First wins.
    pub fn request_handler<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        let instance: Arc<dyn RequestHandler<R>> = Arc::new(handler);
        self.insert_first_wins(
            ServiceKey::of::<dyn RequestHandler<R>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register the terminal handler for stream request type `R`. First wins.
    pub fn stream_handler<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: StreamRequest,
        H: StreamHandler<R> + 'static,
    {
        let instance: Arc<dyn StreamHandler<R>> = Arc::new(handler);
        self.insert_first_wins(
            ServiceKey::of::<dyn StreamHandler<R>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a handler for notification type `N`. Add-distinct.
    pub fn notification_handler<N, H>(&mut self, handler: H) -> &mut Self
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
    {
        let instance: Arc<dyn NotificationHandler<N>> = Arc::new(handler);
        self.insert_distinct(
            ServiceKey::of::<dyn NotificationHandler<N>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a pre-processor for message type `M` (request or
    /// stream request). Add-distinct.
    pub fn pre_processor<M, H>(&mut self, processor: H) -> &mut Self
    where
        M: Send + Sync + 'static,
        H: PreProcessor<M> + 'static,
    {
        let instance: Arc<dyn PreProcessor<M>> = Arc::new(processor);
        self.insert_distinct(
            ServiceKey::of::<dyn PreProcessor<M>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a post-processor for request type `R`. Add-distinct.
    pub fn post_processor<R, H>(&mut self, processor: H) -> &mut Self
    where
        R: Request,
        H: PostProcessor<R> + 'static,
    {
        let instance: Arc<dyn PostProcessor<R>> = Arc::new(processor);
        self.insert_distinct(
            ServiceKey::of::<dyn PostProcessor<R>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a pipeline behavior for request type `R`. Add-distinct;
    /// the first registered behavior is the outermost.
    pub fn behavior<R, H>(&mut self, behavior: H) -> &mut Self
    where
        R: Request,
        H: Behavior<R> + 'static,
    {
        let instance: Arc<dyn Behavior<R>> = Arc::new(behavior);
        self.insert_distinct(
            ServiceKey::of::<dyn Behavior<R>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a stream behavior for stream request type `R`.
    /// Add-distinct; the first registered behavior is the outermost.
    pub fn stream_behavior<R, H>(&mut self, behavior: H) -> &mut Self
    where
        R: StreamRequest,
        H: StreamBehavior<R> + 'static,
    {
        let instance: Arc<dyn StreamBehavior<R>> = Arc::new(behavior);
        self.insert_distinct(
            ServiceKey::of::<dyn StreamBehavior<R>>(),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a fault handler for request type `R`, consulted when a
    /// fault of kind `E` (or one declaring `E` as ancestor) is raised.
    /// Add-distinct.
    pub fn fault_handler<E, R, H>(&mut self, handler: H) -> &mut Self
    where
        E: Fault,
        R: Request,
        H: FaultHandler<R> + 'static,
    {
        let instance: Arc<dyn FaultHandler<R>> = Arc::new(handler);
        self.insert_distinct(
            ServiceKey::of::<dyn FaultHandler<R>>().with_fault(TypeId::of::<E>()),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a universal fault handler for request type `R`,
    /// consulted for any non-cancellation fault that no more specific
    /// tier recovered. Add-distinct.
    pub fn fault_handler_any<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: Request,
        H: FaultHandler<R> + 'static,
    {
        let instance: Arc<dyn FaultHandler<R>> = Arc::new(handler);
        self.insert_distinct(
            ServiceKey::of::<dyn FaultHandler<R>>().with_fault(TypeId::of::<AnyKind>()),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a stream fault handler for stream request type `R` and
    /// fault kind `E`. Add-distinct.
    pub fn stream_fault_handler<E, R, H>(&mut self, handler: H) -> &mut Self
    where
        E: Fault,
        R: StreamRequest,
        H: StreamFaultHandler<R> + 'static,
    {
        let instance: Arc<dyn StreamFaultHandler<R>> = Arc::new(handler);
        self.insert_distinct(
            ServiceKey::of::<dyn StreamFaultHandler<R>>().with_fault(TypeId::of::<E>()),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a universal stream fault handler for stream request
    /// type `R`. Add-distinct.
    pub fn stream_fault_handler_any<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: StreamRequest,
        H: StreamFaultHandler<R> + 'static,
    {
        let instance: Arc<dyn StreamFaultHandler<R>> = Arc::new(handler);
        self.insert_distinct(
            ServiceKey::of::<dyn StreamFaultHandler<R>>().with_fault(TypeId::of::<AnyKind>()),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a fault action for message type `M` and fault kind `E`.
    /// Add-distinct.
    pub fn fault_action<E, M, H>(&mut self, action: H) -> &mut Self
    where
        E: Fault,
        M: Send + Sync + 'static,
        H: FaultAction<M> + 'static,
    {
        let instance: Arc<dyn FaultAction<M>> = Arc::new(action);
        self.insert_distinct(
            ServiceKey::of::<dyn FaultAction<M>>().with_fault(TypeId::of::<E>()),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    /// Register a universal fault action for message type `M`.
    /// Add-distinct.
    pub fn fault_action_any<M, H>(&mut self, action: H) -> &mut Self
    where
        M: Send + Sync + 'static,
        H: FaultAction<M> + 'static,
    {
        let instance: Arc<dyn FaultAction<M>> = Arc::new(action);
        self.insert_distinct(
            ServiceKey::of::<dyn FaultAction<M>>().with_fault(TypeId::of::<AnyKind>()),
            TypeId::of::<H>(),
            Arc::new(instance),
        );
        self
    }

    fn insert_first_wins(&mut self, key: ServiceKey, concrete: TypeId, instance: Service) {
        let slot = self.services.entry(key).or_default();
        if !slot.is_empty() {
            tracing::debug!(service = key.name(), "duplicate terminal handler ignored");
            return;
        }
        slot.push(Registered { concrete, instance });
    }

    fn insert_distinct(&mut self, key: ServiceKey, concrete: TypeId, instance: Service) {
        let slot = self.services.entry(key).or_default();
        if slot.iter().any(|entry| entry.concrete == concrete) {
            tracing::debug!(service = key.name(), "duplicate registration collapsed");
            return;
        }
        slot.push(Registered { concrete, instance });
    }
}

impl Locator for Registry {
    fn resolve_all(&self, key: ServiceKey) -> Vec<Service> {
        self.services
            .get(&key)
            .map(|entries| entries.iter().map(|entry| entry.instance.clone()).collect())
            .unwrap_or_default()
    }
}
