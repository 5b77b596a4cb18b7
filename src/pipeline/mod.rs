//! Pipeline composition.
//!
//! Builds the onion around a terminal handler: pre-processors fire in
//! registration order, behaviors nest in registration order (first
//! registered is outermost), post-processors fire in order after the
//! handler succeeds. Composition walks the behavior list in reverse,
//! wrapping the current inner stage into each behavior's `next`
//! capability.
//!
//! Post-processors live inside the innermost stage, so a behavior that
//! short-circuits skips them along with the handler.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerResult;
use crate::handler::{
    Behavior, ItemStream, Next, PostProcessor, PreProcessor, StreamBehavior, StreamNext,
};
use crate::locator::{resolve_role, role, Locator, ServiceKey};
use crate::message::{Request, StreamRequest};

/// A stage of the composed request pipeline.
pub(crate) type PipelineStage<'a, T> =
    Box<dyn FnOnce() -> BoxFuture<'a, HandlerResult<T>> + Send + 'a>;

/// Run the full request pipeline around `terminal`.
///
/// Resolution failures and stage failures are returned to the caller,
/// which routes them through fault recovery.
pub(crate) async fn run_request<'a, R>(
    locator: &'a dyn Locator,
    request: &'a R,
    token: &'a CancellationToken,
    terminal: PipelineStage<'a, R::Response>,
) -> HandlerResult<R::Response>
where
    R: Request,
{
    let pre: Vec<Arc<dyn PreProcessor<R>>> = resolve_role(
        locator,
        ServiceKey::of::<dyn PreProcessor<R>>(),
        role::PRE_PROCESSOR,
    )?;
    let post: Vec<Arc<dyn PostProcessor<R>>> = resolve_role(
        locator,
        ServiceKey::of::<dyn PostProcessor<R>>(),
        role::POST_PROCESSOR,
    )?;
    let behaviors: Vec<Arc<dyn Behavior<R>>> =
        resolve_role(locator, ServiceKey::of::<dyn Behavior<R>>(), role::BEHAVIOR)?;

    for processor in &pre {
        processor.process(request, token).await?;
    }

    let mut inner: PipelineStage<'a, R::Response> = Box::new(move || {
        Box::pin(async move {
            let response = terminal().await?;
            for processor in &post {
                processor.process(request, &response, token).await?;
            }
            Ok(response)
        })
    });

    for behavior in behaviors.into_iter().rev() {
        let next = Next::new(inner);
        inner = Box::new(move || {
            Box::pin(async move { behavior.handle(request, next, token).await })
        });
    }

    inner().await
}

/// Compose the stream pipeline around `terminal`.
///
/// Same nesting as the request variant, minus post-processors; the
/// chain is composed over a producer of the item stream, and invoking
/// the composed head builds (but does not drive) the stream.
pub(crate) fn compose_stream<R>(
    behaviors: Vec<Arc<dyn StreamBehavior<R>>>,
    request: &Arc<R>,
    token: &CancellationToken,
    terminal: Box<dyn FnOnce() -> ItemStream<R::Item> + Send>,
) -> ItemStream<R::Item>
where
    R: StreamRequest,
{
    let mut inner = terminal;
    for behavior in behaviors.into_iter().rev() {
        let request = request.clone();
        let token = token.clone();
        let next = StreamNext::new(inner);
        inner = Box::new(move || behavior.handle(request, next, token));
    }
    inner()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::StreamExt;

    use crate::locator::Registry;

    use super::*;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn record(trace: &Trace, event: &str) {
        trace.lock().unwrap().push(event.to_string());
    }

    struct Req {
        trace: Trace,
    }

    impl Request for Req {
        type Response = String;
    }

    struct Pre(&'static str);

    #[async_trait]
    impl PreProcessor<Req> for Pre {
        async fn process(&self, request: &Req, _: &CancellationToken) -> HandlerResult<()> {
            record(&request.trace, self.0);
            Ok(())
        }
    }

    struct Post(&'static str);

    #[async_trait]
    impl PostProcessor<Req> for Post {
        async fn process(
            &self,
            request: &Req,
            _: &String,
            _: &CancellationToken,
        ) -> HandlerResult<()> {
            record(&request.trace, self.0);
            Ok(())
        }
    }

    struct Wrap(&'static str);

    #[async_trait]
    impl Behavior<Req> for Wrap {
        async fn handle(
            &self,
            request: &Req,
            next: Next<'_, String>,
            _: &CancellationToken,
        ) -> HandlerResult<String> {
            record(&request.trace, &format!("{}:pre", self.0));
            let response = next.run().await?;
            record(&request.trace, &format!("{}:post", self.0));
            Ok(response)
        }
    }

    struct Short;

    #[async_trait]
    impl Behavior<Req> for Short {
        async fn handle(
            &self,
            request: &Req,
            _next: Next<'_, String>,
            _: &CancellationToken,
        ) -> HandlerResult<String> {
            record(&request.trace, "short");
            Ok("short".into())
        }
    }

    fn terminal<'a>(request: &'a Req) -> PipelineStage<'a, String> {
        Box::new(move || {
            Box::pin(async move {
                record(&request.trace, "handler");
                Ok("done".into())
            })
        })
    }

    #[tokio::test]
    async fn test_pipeline_order() {
        let mut registry = Registry::new();
        registry
            .pre_processor::<Req, _>(Pre("p1"))
            .pre_processor::<Req, _>(Pre("p2"))
            .behavior::<Req, _>(Wrap("b1"))
            .behavior::<Req, _>(Wrap("b2"))
            .post_processor::<Req, _>(Post("q1"))
            .post_processor::<Req, _>(Post("q2"));

        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let request = Req {
            trace: trace.clone(),
        };
        let token = CancellationToken::new();

        let response = run_request(&registry, &request, &token, terminal(&request))
            .await
            .unwrap();

        assert_eq!(response, "done");
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["p1", "p2", "b1:pre", "b2:pre", "handler", "b2:post", "b1:post", "q1", "q2"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler_and_posts() {
        let mut registry = Registry::new();
        registry
            .behavior::<Req, _>(Short)
            .behavior::<Req, _>(Wrap("inner"))
            .post_processor::<Req, _>(Post("q1"));

        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let request = Req {
            trace: trace.clone(),
        };
        let token = CancellationToken::new();

        let response = run_request(&registry, &request, &token, terminal(&request))
            .await
            .unwrap();

        assert_eq!(response, "short");
        assert_eq!(*trace.lock().unwrap(), vec!["short"]);
    }

    #[tokio::test]
    async fn test_bare_pipeline_is_just_the_handler() {
        let registry = Registry::new();
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let request = Req {
            trace: trace.clone(),
        };
        let token = CancellationToken::new();

        let response = run_request(&registry, &request, &token, terminal(&request))
            .await
            .unwrap();

        assert_eq!(response, "done");
        assert_eq!(*trace.lock().unwrap(), vec!["handler"]);
    }

    struct Nums;

    impl StreamRequest for Nums {
        type Item = i64;
    }

    struct Double;

    impl StreamBehavior<Nums> for Double {
        fn handle(
            &self,
            _request: Arc<Nums>,
            next: StreamNext<i64>,
            _token: CancellationToken,
        ) -> ItemStream<i64> {
            Box::pin(next.stream().map(|item| item.map(|n| n * 2)))
        }
    }

    #[tokio::test]
    async fn test_stream_compose_transforms_items() {
        let behaviors: Vec<Arc<dyn StreamBehavior<Nums>>> = vec![Arc::new(Double)];
        let request = Arc::new(Nums);
        let token = CancellationToken::new();
        let terminal: Box<dyn FnOnce() -> ItemStream<i64> + Send> =
            Box::new(|| Box::pin(futures::stream::iter([1i64, 2, 3].map(Ok))));

        let items: Vec<i64> = compose_stream(behaviors, &request, &token, terminal)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(items, vec![2, 4, 6]);
    }
}
