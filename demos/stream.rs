//! Stream - streaming dispatch example with mid-stream recovery.
//!
//! This example demonstrates:
//! - Defining a stream request and its handler
//! - Transforming elements with a stream behavior
//! - Swapping in a replacement stream when the source fails
//!
//! Run with:
//!
//! ```sh
//! cargo run --example stream
//! ```

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;

use courier::{
    async_trait, CancellationToken, Dispatcher, Fault, HandlerResult, ItemStream, Registry,
    StreamBehavior, StreamFaultHandler, StreamHandler, StreamNext, StreamRecoveryState,
    StreamRequest,
};

/// Asks for a count-up that gets unreliable past a threshold.
struct Generate {
    count: u64,
}

impl StreamRequest for Generate {
    type Item = u64;
}

#[derive(Debug, thiserror::Error)]
#[error("generator wore out at {0}")]
struct WoreOut(u64);

impl Fault for WoreOut {}

struct Generator;

impl StreamHandler<Generate> for Generator {
    fn handle(&self, request: Arc<Generate>, token: CancellationToken) -> ItemStream<u64> {
        Box::pin(stream! {
            for n in 0..request.count {
                if token.is_cancelled() {
                    return;
                }
                if n >= 3 {
                    yield Err(WoreOut(n).into());
                    return;
                }
                yield Ok(n);
            }
        })
    }
}

/// Doubles every element the source produces.
struct Double;

impl StreamBehavior<Generate> for Double {
    fn handle(
        &self,
        _request: Arc<Generate>,
        next: StreamNext<u64>,
        _token: CancellationToken,
    ) -> ItemStream<u64> {
        Box::pin(next.stream().map(|item| item.map(|n| n * 2)))
    }
}

/// Finishes the count-up from wherever the generator wore out.
struct ResumeFrom;

#[async_trait]
impl StreamFaultHandler<Generate> for ResumeFrom {
    async fn handle(
        &self,
        request: &Generate,
        fault: &dyn Fault,
        state: &mut StreamRecoveryState<u64>,
        _token: &CancellationToken,
    ) -> HandlerResult<()> {
        if let Some(WoreOut(at)) = fault.downcast_ref::<WoreOut>() {
            state.set_handled_with_items(*at..request.count);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> HandlerResult<()> {
    tracing_subscriber::fmt::init();

    let mut registry = Registry::new();
    registry
        .stream_handler(Generator)
        .stream_behavior::<Generate, _>(Double)
        .stream_fault_handler::<WoreOut, Generate, _>(ResumeFrom);

    let dispatcher = Dispatcher::new(Arc::new(registry));

    let mut items = dispatcher.create_stream(Generate { count: 6 }, CancellationToken::new());
    while let Some(item) = items.next().await {
        println!("item: {}", item?);
    }

    Ok(())
}
