//! Request executor.
//!
//! Per dispatch: fetch the cached table entry, resolve the terminal
//! handler (failing with *NoHandler* when absent), run the composed
//! pipeline, and route any failure through fault recovery. A recovered
//! failure is invisible to the caller; an unrecovered one comes back as
//! the original boxed fault.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::DispatchCaches;
use crate::error::{DispatchError, HandlerResult};
use crate::locator::{role, Locator};
use crate::message::Request;
use crate::pipeline::{self, PipelineStage};
use crate::recovery;

pub(crate) async fn send<R: Request>(
    locator: &Arc<dyn Locator>,
    caches: &DispatchCaches,
    request: &R,
    token: &CancellationToken,
) -> HandlerResult<R::Response> {
    let entry = caches.request_entry::<R>();

    let service = match locator.resolve_all(entry.handler_key).into_iter().next() {
        Some(service) => service,
        None => {
            return Err(DispatchError::NoHandler {
                message: entry.message,
                role: role::REQUEST_HANDLER,
            }
            .into())
        }
    };

    let invoke = entry.invoke;
    let terminal: PipelineStage<'_, R::Response> =
        Box::new(move || invoke(service, request, token));

    match pipeline::run_request(locator.as_ref(), request, token, terminal).await {
        Ok(response) => Ok(response),
        Err(fault) => {
            recovery::recover_request(locator.as_ref(), &caches.tiers, request, fault, token).await
        }
    }
}
