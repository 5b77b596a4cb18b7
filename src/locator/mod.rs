//! Service location.
//!
//! The dispatcher never owns collaborator instances; it asks a
//! [`Locator`] for them on every dispatch. The contract is minimal:
//! resolve *all* instances registered under a [`ServiceKey`] - the core
//! enforces cardinality on top, so the contract is identical for
//! singleton roles (terminal handlers) and multi-services (processors,
//! behaviors, fault handlers).
//!
//! [`Registry`] is the in-crate implementation; any dependency
//! injection container can stand in by implementing [`Locator`].

mod registry;

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::{DispatchError, HandlerResult};

pub use registry::Registry;

/// A type-erased collaborator instance.
///
/// The concrete stored type is `Arc<dyn Trait>` for the role's trait
/// object; the dispatch table downcasts it back on the warm path.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Identifies a closed service shape.
///
/// A key is the [`TypeId`] of the role's trait object (for example
/// `dyn RequestHandler<Ping>`), optionally refined by a fault kind for
/// the recovery family, plus the type name for diagnostics. Equality
/// and hashing ignore the name.
#[derive(Clone, Copy, Debug)]
pub struct ServiceKey {
    service: TypeId,
    fault: Option<TypeId>,
    name: &'static str,
}

impl ServiceKey {
    /// Key for the service shape `S` (usually a trait object type).
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            service: TypeId::of::<S>(),
            fault: None,
            name: std::any::type_name::<S>(),
        }
    }

    /// Refine this key with a fault kind (recovery family only).
    pub fn with_fault(mut self, kind: TypeId) -> Self {
        self.fault = Some(kind);
        self
    }

    /// The diagnostic name of the service shape.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn service_id(&self) -> TypeId {
        self.service
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service && self.fault == other.fault
    }
}

impl Eq for ServiceKey {}

impl std::hash::Hash for ServiceKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.service.hash(state);
        self.fault.hash(state);
    }
}

/// Resolves collaborator instances for the dispatcher.
///
/// `resolve_all` returns an empty collection - never an error - when
/// nothing is registered under the key, and never returns placeholder
/// elements. It may be called several times per dispatch (once per
/// collaborator role) and must be safe under concurrent invocation.
pub trait Locator: Send + Sync {
    /// All instances registered under `key`, in registration order.
    fn resolve_all(&self, key: ServiceKey) -> Vec<Service>;
}

/// Handler role names used in diagnostics.
pub(crate) mod role {
    pub const REQUEST_HANDLER: &str = "request handler";
    pub const STREAM_HANDLER: &str = "stream handler";
    pub const NOTIFICATION_HANDLER: &str = "notification handler";
    pub const PRE_PROCESSOR: &str = "pre-processor";
    pub const POST_PROCESSOR: &str = "post-processor";
    pub const BEHAVIOR: &str = "pipeline behavior";
    pub const STREAM_BEHAVIOR: &str = "stream behavior";
    pub const FAULT_HANDLER: &str = "fault handler";
    pub const STREAM_FAULT_HANDLER: &str = "stream fault handler";
    pub const FAULT_ACTION: &str = "fault action";
}

/// Resolve every instance under `key` and downcast to the expected
/// trait-object shape, failing with *NoDispatchShape* on a mismatch.
pub(crate) fn resolve_role<S: ?Sized + 'static>(
    locator: &dyn Locator,
    key: ServiceKey,
    role: &'static str,
) -> HandlerResult<Vec<Arc<S>>> {
    let services = locator.resolve_all(key);
    let mut out = Vec::with_capacity(services.len());
    for service in services {
        match service.downcast_ref::<Arc<S>>() {
            Some(instance) => out.push(instance.clone()),
            None => {
                return Err(DispatchError::NoDispatchShape {
                    service: key.name(),
                    role,
                }
                .into())
            }
        }
    }
    Ok(out)
}
