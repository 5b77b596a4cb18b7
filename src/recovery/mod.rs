//! Fault processing.
//!
//! When a pipeline stage fails, the executor hands the boxed fault to
//! this module. The processor walks the fault's lineage - the concrete
//! kind, each declared ancestor kind in order, then the universal tier -
//! resolving fault handlers for every tier and invoking them in
//! resolution order. The first handler that marks the recovery state
//! handled decides the outcome. If the walk ends unhandled, fault
//! actions run over the same lineage, and the original fault is
//! returned unchanged.
//!
//! Cancellation is deliberately narrow: a [`Cancelled`] fault walks only
//! its exact tier, so universal handlers never swallow it. Core
//! diagnostics ([`DispatchError`]) bypass the processor entirely and
//! surface as-is.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use crate::error::{Cancelled, DispatchError, Fault, FaultBox, HandlerResult};
use crate::handler::{
    FaultAction, FaultHandler, ItemStream, RecoveryState, StreamFaultHandler, StreamRecoveryState,
};
use crate::locator::{resolve_role, role, Locator, ServiceKey};
use crate::message::{Request, StreamRequest};

/// Marker for the universal fault tier. Never instantiated; only its
/// `TypeId` is used as the tier key.
pub(crate) enum AnyKind {}

/// Caches the ordered tier keys for a `(service shape, fault kind)`
/// pair, so the lineage walk computes keys once per concrete fault
/// type.
pub(crate) struct TierCache {
    entries: RwLock<HashMap<(TypeId, TypeId), Arc<Vec<ServiceKey>>>>,
}

impl TierCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The ordered service keys to resolve for `fault` under `base`.
    pub fn tiers(&self, base: ServiceKey, fault: &dyn Fault) -> Arc<Vec<ServiceKey>> {
        let key = (base.service_id(), fault.type_id());
        if let Some(tiers) = self.entries.read().expect("tier cache poisoned").get(&key) {
            return tiers.clone();
        }

        let mut kinds = fault.lineage();
        if !fault.is::<Cancelled>() {
            kinds.push(TypeId::of::<AnyKind>());
        }
        let tiers: Arc<Vec<ServiceKey>> =
            Arc::new(kinds.into_iter().map(|kind| base.with_fault(kind)).collect());

        let mut entries = self.entries.write().expect("tier cache poisoned");
        entries.entry(key).or_insert_with(|| tiers.clone()).clone()
    }
}

/// Process a failed request dispatch.
///
/// Returns `Ok(recovery value)` when a handler marked the fault
/// handled; otherwise runs the actions and returns the original fault.
pub(crate) async fn recover_request<R: Request>(
    locator: &dyn Locator,
    tiers: &TierCache,
    request: &R,
    fault: FaultBox,
    token: &CancellationToken,
) -> HandlerResult<R::Response> {
    // Core diagnostics surface as-is; only user failures are
    // recoverable.
    if fault.is::<DispatchError>() {
        return Err(fault);
    }

    let handler_tiers = tiers.tiers(ServiceKey::of::<dyn FaultHandler<R>>(), fault.as_ref());
    let mut state = RecoveryState::new();

    for key in handler_tiers.iter() {
        let handlers: Vec<Arc<dyn FaultHandler<R>>> =
            resolve_role(locator, *key, role::FAULT_HANDLER)?;
        for handler in handlers {
            handler
                .handle(request, fault.as_ref(), &mut state, token)
                .await?;
            if let Some(value) = state.take() {
                tracing::debug!(fault = %fault, "fault recovered");
                return Ok(value);
            }
        }
    }

    run_actions(locator, tiers, request, fault.as_ref(), token).await?;
    Err(fault)
}

/// Process a failed stream dispatch.
///
/// Returns `Ok(replacement stream)` when a handler marked the fault
/// handled; otherwise runs the actions and returns the original fault.
pub(crate) async fn recover_stream<R: StreamRequest>(
    locator: &dyn Locator,
    tiers: &TierCache,
    request: &R,
    fault: FaultBox,
    token: &CancellationToken,
) -> HandlerResult<ItemStream<R::Item>> {
    if fault.is::<DispatchError>() {
        return Err(fault);
    }

    let handler_tiers = tiers.tiers(
        ServiceKey::of::<dyn StreamFaultHandler<R>>(),
        fault.as_ref(),
    );
    let mut state = StreamRecoveryState::new();

    for key in handler_tiers.iter() {
        let handlers: Vec<Arc<dyn StreamFaultHandler<R>>> =
            resolve_role(locator, *key, role::STREAM_FAULT_HANDLER)?;
        for handler in handlers {
            handler
                .handle(request, fault.as_ref(), &mut state, token)
                .await?;
            if let Some(replacement) = state.take() {
                tracing::debug!(fault = %fault, "stream fault recovered");
                return Ok(replacement);
            }
        }
    }

    run_actions(locator, tiers, request, fault.as_ref(), token).await?;
    Err(fault)
}

/// Run the fault actions for an unrecovered failure.
///
/// An action that fails propagates its own fault, replacing the
/// original; remaining actions do not run.
async fn run_actions<M: Send + Sync + 'static>(
    locator: &dyn Locator,
    tiers: &TierCache,
    message: &M,
    fault: &dyn Fault,
    token: &CancellationToken,
) -> HandlerResult<()> {
    let action_tiers = tiers.tiers(ServiceKey::of::<dyn FaultAction<M>>(), fault);
    for key in action_tiers.iter() {
        let actions: Vec<Arc<dyn FaultAction<M>>> = resolve_role(locator, *key, role::FAULT_ACTION)?;
        for action in actions {
            action.execute(message, fault, token).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::locator::Registry;

    use super::*;

    struct Fetch;

    impl Request for Fetch {
        type Response = &'static str;
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fetch failed")]
    struct FetchFault;

    impl Fault for FetchFault {}

    struct Recover(&'static str);

    #[async_trait]
    impl FaultHandler<Fetch> for Recover {
        async fn handle(
            &self,
            _: &Fetch,
            _: &dyn Fault,
            state: &mut RecoveryState<&'static str>,
            _: &CancellationToken,
        ) -> HandlerResult<()> {
            state.set_handled(self.0);
            Ok(())
        }
    }

    struct CountAction(Arc<AtomicUsize>);

    #[async_trait]
    impl FaultAction<Fetch> for CountAction {
        async fn execute(
            &self,
            _: &Fetch,
            _: &dyn Fault,
            _: &CancellationToken,
        ) -> HandlerResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_specific_tier_beats_universal() {
        let mut registry = Registry::new();
        registry
            .fault_handler::<FetchFault, Fetch, _>(Recover("specific"))
            .fault_handler_any::<Fetch, _>(Recover("fallback"));
        let tiers = TierCache::new();
        let token = CancellationToken::new();

        let value = recover_request(&registry, &tiers, &Fetch, FetchFault.into(), &token)
            .await
            .unwrap();
        assert_eq!(value, "specific");
    }

    #[tokio::test]
    async fn test_actions_run_only_when_unhandled() {
        let handled_count = Arc::new(AtomicUsize::new(0));
        let unhandled_count = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let tiers = TierCache::new();

        // Handled: the action must not fire.
        let mut registry = Registry::new();
        registry
            .fault_handler::<FetchFault, Fetch, _>(Recover("ok"))
            .fault_action::<FetchFault, Fetch, _>(CountAction(handled_count.clone()));
        recover_request(&registry, &tiers, &Fetch, FetchFault.into(), &token)
            .await
            .unwrap();
        assert_eq!(handled_count.load(Ordering::SeqCst), 0);

        // Unhandled: the action fires once and the original fault
        // comes back.
        let mut registry = Registry::new();
        registry.fault_action::<FetchFault, Fetch, _>(CountAction(unhandled_count.clone()));
        let fault = recover_request(&registry, &TierCache::new(), &Fetch, FetchFault.into(), &token)
            .await
            .unwrap_err();
        assert_eq!(unhandled_count.load(Ordering::SeqCst), 1);
        assert!(fault.is::<FetchFault>());
    }

    #[tokio::test]
    async fn test_core_diagnostics_bypass_recovery() {
        let mut registry = Registry::new();
        registry.fault_handler_any::<Fetch, _>(Recover("fallback"));
        let tiers = TierCache::new();
        let token = CancellationToken::new();

        let original: FaultBox = DispatchError::NoHandler {
            message: "Fetch",
            role: "request handler",
        }
        .into();
        let fault = recover_request(&registry, &tiers, &Fetch, original, &token)
            .await
            .unwrap_err();
        assert!(fault.is::<DispatchError>());
    }

    #[tokio::test]
    async fn test_cancellation_skips_universal_tier() {
        let mut registry = Registry::new();
        registry.fault_handler_any::<Fetch, _>(Recover("fallback"));
        let tiers = TierCache::new();
        let token = CancellationToken::new();

        let fault = recover_request(&registry, &tiers, &Fetch, Cancelled.into(), &token)
            .await
            .unwrap_err();
        assert!(fault.is::<Cancelled>());
    }

    #[tokio::test]
    async fn test_cancellation_recoverable_when_explicit() {
        let mut registry = Registry::new();
        registry.fault_handler::<Cancelled, Fetch, _>(Recover("resumed"));
        let tiers = TierCache::new();
        let token = CancellationToken::new();

        let value = recover_request(&registry, &tiers, &Fetch, Cancelled.into(), &token)
            .await
            .unwrap();
        assert_eq!(value, "resumed");
    }

    #[test]
    fn test_tier_cache_reuses_walk() {
        let tiers = TierCache::new();
        let base = ServiceKey::of::<dyn FaultHandler<Fetch>>();

        let first = tiers.tiers(base, &FetchFault);
        let second = tiers.tiers(base, &FetchFault);
        assert!(Arc::ptr_eq(&first, &second));
        // Concrete kind plus the universal tier.
        assert_eq!(first.len(), 2);
    }
}
