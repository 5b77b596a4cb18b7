//! Ping - simple request/response dispatch example.
//!
//! This example demonstrates:
//! - Defining a request type and its terminal handler
//! - Wrapping the handler with a timing behavior
//! - Recovering a failure with a typed fault handler
//!
//! Run with:
//!
//! ```sh
//! cargo run --example ping
//! ```

use std::sync::Arc;
use std::time::Instant;

use courier::{
    async_trait, Behavior, CancellationToken, Dispatcher, Fault, FaultHandler, HandlerResult,
    Next, RecoveryState, Registry, Request, RequestHandler,
};

/// The request carries the message to echo back.
struct Ping {
    message: String,
}

impl Request for Ping {
    type Response = String;
}

struct PingHandler;

#[async_trait]
impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, request: &Ping, _token: &CancellationToken) -> HandlerResult<String> {
        if request.message.is_empty() {
            return Err(EmptyPing.into());
        }
        Ok(format!("PONG: {}", request.message))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("empty ping")]
struct EmptyPing;

impl Fault for EmptyPing {}

/// Logs how long the rest of the pipeline took.
struct Timing;

#[async_trait]
impl Behavior<Ping> for Timing {
    async fn handle(
        &self,
        _request: &Ping,
        next: Next<'_, String>,
        _token: &CancellationToken,
    ) -> HandlerResult<String> {
        let started = Instant::now();
        let response = next.run().await?;
        tracing::info!(elapsed = ?started.elapsed(), "ping handled");
        Ok(response)
    }
}

/// Turns an empty ping into a default response instead of a failure.
struct EmptyPingRecovery;

#[async_trait]
impl FaultHandler<Ping> for EmptyPingRecovery {
    async fn handle(
        &self,
        _request: &Ping,
        _fault: &dyn Fault,
        state: &mut RecoveryState<String>,
        _token: &CancellationToken,
    ) -> HandlerResult<()> {
        state.set_handled("PONG: (silence)".into());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> HandlerResult<()> {
    tracing_subscriber::fmt::init();

    let mut registry = Registry::new();
    registry
        .request_handler(PingHandler)
        .behavior::<Ping, _>(Timing)
        .fault_handler::<EmptyPing, Ping, _>(EmptyPingRecovery);

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let token = CancellationToken::new();

    let pong = dispatcher
        .send(
            &Ping {
                message: "hello".into(),
            },
            &token,
        )
        .await?;
    println!("{pong}");

    // The handler fails on an empty message; the fault handler answers
    // instead and the failure never reaches us.
    let recovered = dispatcher
        .send(
            &Ping {
                message: String::new(),
            },
            &token,
        )
        .await?;
    println!("{recovered}");

    Ok(())
}
