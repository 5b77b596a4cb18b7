//! Stream executor.
//!
//! Drives a streaming dispatch as a generator with three phases:
//!
//! 1. link the request and enumeration tokens into the effective token;
//! 2. build the initial active stream (pre-processors, then the
//!    composed stream pipeline), routing a setup failure through fault
//!    recovery with replace-stream capability;
//! 3. forward elements from the active stream, swapping in a recovery
//!    replacement whenever an advance fails and a fault handler marks
//!    the failure handled.
//!
//! The consumer sees elements from at most one active stream at a time;
//! a recovered fault is never surfaced, and an unrecovered one is the
//! terminal `Err` item. Dropping the returned stream mid-iteration
//! drops the active source and aborts the token link.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::dispatch::DispatchCaches;
use crate::error::{DispatchError, HandlerResult};
use crate::handler::{ItemStream, PreProcessor, StreamBehavior};
use crate::locator::{resolve_role, role, Locator, ServiceKey};
use crate::message::StreamRequest;
use crate::pipeline;
use crate::recovery;
use crate::stream::{DispatchStream, LinkedToken};

pub(crate) fn create<R: StreamRequest>(
    locator: Arc<dyn Locator>,
    caches: Arc<DispatchCaches>,
    request: R,
    token: CancellationToken,
) -> DispatchStream<R::Item> {
    let request = Arc::new(request);
    DispatchStream::new(Box::new(move |enumeration| {
        run::<R>(locator, caches, request, token, enumeration)
    }))
}

fn run<R: StreamRequest>(
    locator: Arc<dyn Locator>,
    caches: Arc<DispatchCaches>,
    request: Arc<R>,
    request_token: CancellationToken,
    enumeration: Option<CancellationToken>,
) -> ItemStream<R::Item> {
    Box::pin(stream! {
        let link = match enumeration {
            Some(enumeration) => LinkedToken::link(&request_token, &enumeration),
            None => LinkedToken::passthrough(request_token),
        };
        let token = link.token().clone();

        let mut active = match setup::<R>(&locator, &caches, &request, &token).await {
            Ok(stream) => stream,
            Err(fault) => {
                match recovery::recover_stream::<R>(
                    locator.as_ref(),
                    &caches.tiers,
                    request.as_ref(),
                    fault,
                    &token,
                )
                .await
                {
                    Ok(replacement) => replacement,
                    Err(fault) => {
                        yield Err(fault);
                        return;
                    }
                }
            }
        };

        loop {
            match active.next().await {
                Some(Ok(item)) => yield Ok(item),
                Some(Err(fault)) => {
                    // Dispose the failed source before recovery runs.
                    drop(active);
                    match recovery::recover_stream::<R>(
                        locator.as_ref(),
                        &caches.tiers,
                        request.as_ref(),
                        fault,
                        &token,
                    )
                    .await
                    {
                        Ok(replacement) => active = replacement,
                        Err(fault) => {
                            yield Err(fault);
                            return;
                        }
                    }
                }
                None => return,
            }
        }
    })
}

/// Resolve the terminal handler, run the pre-processors, and compose
/// the stream pipeline into the initial active stream.
async fn setup<R: StreamRequest>(
    locator: &Arc<dyn Locator>,
    caches: &DispatchCaches,
    request: &Arc<R>,
    token: &CancellationToken,
) -> HandlerResult<ItemStream<R::Item>> {
    let entry = caches.stream_entry::<R>();

    let service = match locator.resolve_all(entry.handler_key).into_iter().next() {
        Some(service) => service,
        None => {
            return Err(DispatchError::NoHandler {
                message: entry.message,
                role: role::STREAM_HANDLER,
            }
            .into())
        }
    };

    let pre: Vec<Arc<dyn PreProcessor<R>>> = resolve_role(
        locator.as_ref(),
        ServiceKey::of::<dyn PreProcessor<R>>(),
        role::PRE_PROCESSOR,
    )?;
    for processor in &pre {
        processor.process(request.as_ref(), token).await?;
    }

    let behaviors: Vec<Arc<dyn StreamBehavior<R>>> = resolve_role(
        locator.as_ref(),
        ServiceKey::of::<dyn StreamBehavior<R>>(),
        role::STREAM_BEHAVIOR,
    )?;

    let invoke = entry.invoke;
    let terminal_request = request.clone();
    let terminal_token = token.clone();
    let terminal: Box<dyn FnOnce() -> ItemStream<R::Item> + Send> =
        Box::new(move || invoke(service, terminal_request, terminal_token));

    Ok(pipeline::compose_stream(behaviors, request, token, terminal))
}
