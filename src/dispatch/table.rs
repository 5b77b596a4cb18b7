//! Per-shape dispatch entries.
//!
//! An entry binds a concrete message type to the service key its
//! terminal handler resolves against and to a monomorphized invoker.
//! The invoker's body is a single downcast of the erased service
//! instance followed by the virtual handler call; everything else
//! (key construction, type names) is precomputed at build time.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, HandlerResult};
use crate::handler::{ItemStream, RequestHandler, StreamHandler};
use crate::locator::{role, Service, ServiceKey};
use crate::message::{Request, StreamRequest};

/// Dispatch entry for a request type: terminal handler key + invoker.
pub(crate) struct RequestEntry<R: Request> {
    pub handler_key: ServiceKey,
    pub message: &'static str,
    pub invoke:
        for<'a> fn(Service, &'a R, &'a CancellationToken) -> BoxFuture<'a, HandlerResult<R::Response>>,
}

impl<R: Request> RequestEntry<R> {
    pub fn build() -> Self {
        Self {
            handler_key: ServiceKey::of::<dyn RequestHandler<R>>(),
            message: std::any::type_name::<R>(),
            invoke: invoke_request::<R>,
        }
    }
}

fn invoke_request<'a, R: Request>(
    service: Service,
    request: &'a R,
    token: &'a CancellationToken,
) -> BoxFuture<'a, HandlerResult<R::Response>> {
    Box::pin(async move {
        match service.downcast_ref::<Arc<dyn RequestHandler<R>>>() {
            Some(handler) => handler.handle(request, token).await,
            None => Err(DispatchError::NoDispatchShape {
                service: std::any::type_name::<dyn RequestHandler<R>>(),
                role: role::REQUEST_HANDLER,
            }
            .into()),
        }
    })
}

/// Dispatch entry for a stream request type.
pub(crate) struct StreamEntry<R: StreamRequest> {
    pub handler_key: ServiceKey,
    pub message: &'static str,
    pub invoke: fn(Service, Arc<R>, CancellationToken) -> ItemStream<R::Item>,
}

impl<R: StreamRequest> StreamEntry<R> {
    pub fn build() -> Self {
        Self {
            handler_key: ServiceKey::of::<dyn StreamHandler<R>>(),
            message: std::any::type_name::<R>(),
            invoke: invoke_stream::<R>,
        }
    }
}

fn invoke_stream<R: StreamRequest>(
    service: Service,
    request: Arc<R>,
    token: CancellationToken,
) -> ItemStream<R::Item> {
    match service.downcast_ref::<Arc<dyn StreamHandler<R>>>() {
        Some(handler) => handler.handle(request, token),
        None => {
            let fault = DispatchError::NoDispatchShape {
                service: std::any::type_name::<dyn StreamHandler<R>>(),
                role: role::STREAM_HANDLER,
            };
            Box::pin(futures::stream::once(std::future::ready(Err(fault.into()))))
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;

    struct Echo(String);

    impl Request for Echo {
        type Response = String;
    }

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler<Echo> for EchoHandler {
        async fn handle(&self, request: &Echo, _: &CancellationToken) -> HandlerResult<String> {
            Ok(request.0.clone())
        }
    }

    #[tokio::test]
    async fn test_request_invoker_calls_handler() {
        let entry = RequestEntry::<Echo>::build();
        let handler: Arc<dyn RequestHandler<Echo>> = Arc::new(EchoHandler);
        let service: Service = Arc::new(handler);

        let response = (entry.invoke)(service, &Echo("hi".into()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response, "hi");
    }

    #[tokio::test]
    async fn test_request_invoker_rejects_wrong_shape() {
        let entry = RequestEntry::<Echo>::build();
        let service: Service = Arc::new("not a handler");

        let fault = (entry.invoke)(service, &Echo("hi".into()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            fault.downcast_ref::<DispatchError>(),
            Some(DispatchError::NoDispatchShape { .. })
        ));
    }

    struct Count(u32);

    impl StreamRequest for Count {
        type Item = u32;
    }

    struct CountHandler;

    impl StreamHandler<Count> for CountHandler {
        fn handle(&self, request: Arc<Count>, _: CancellationToken) -> ItemStream<u32> {
            Box::pin(futures::stream::iter((0..request.0).map(Ok)))
        }
    }

    #[tokio::test]
    async fn test_stream_invoker_produces_items() {
        let entry = StreamEntry::<Count>::build();
        let handler: Arc<dyn StreamHandler<Count>> = Arc::new(CountHandler);
        let service: Service = Arc::new(handler);

        let items: Vec<u32> = (entry.invoke)(service, Arc::new(Count(3)), CancellationToken::new())
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![0, 1, 2]);
    }
}
