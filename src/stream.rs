//! The stream handed to consumers of a streaming dispatch.
//!
//! [`DispatchStream`] is lazy: nothing resolves or runs until the first
//! poll, so a consumer can still attach its own cancellation token with
//! [`DispatchStream::with_cancellation`] after the dispatch call. When
//! both a request token and an enumeration token are present, the
//! effective token observed by collaborators is cancelled as soon as
//! either parent is.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::FaultBox;
use crate::handler::ItemStream;

pub(crate) type BuildFn<T> =
    Box<dyn FnOnce(Option<CancellationToken>) -> ItemStream<T> + Send>;

/// A lazy stream of dispatch results.
///
/// Faults that escape recovery surface as the final `Err` item; a
/// recovered fault is never observed. Dropping the stream at any point
/// releases the active source stream and the token link.
pub struct DispatchStream<T> {
    build: Option<BuildFn<T>>,
    enumeration: Option<CancellationToken>,
    inner: Option<ItemStream<T>>,
}

impl<T> DispatchStream<T> {
    pub(crate) fn new(build: BuildFn<T>) -> Self {
        Self {
            build: Some(build),
            enumeration: None,
            inner: None,
        }
    }

    /// Attach the consumer's own cancellation token.
    ///
    /// Must be called before the first poll; afterwards the pipeline is
    /// already running with the effective token and the call is ignored
    /// with a warning.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        if self.build.is_some() {
            self.enumeration = Some(token);
        } else {
            tracing::warn!("enumeration token attached after iteration started; ignored");
        }
        self
    }
}

impl<T> Stream for DispatchStream<T> {
    type Item = Result<T, FaultBox>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(build) = this.build.take() {
            this.inner = Some(build(this.enumeration.take()));
        }
        match this.inner.as_mut() {
            Some(inner) => inner.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

/// The effective cancellation token for one streaming dispatch.
///
/// Linking spawns a forwarder that cancels the child when the
/// enumeration token fires; the request token cancels the child
/// directly through the parent/child relationship. The forwarder is
/// aborted when the link is dropped, which happens when iteration
/// terminates on any path.
pub(crate) struct LinkedToken {
    token: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
}

impl LinkedToken {
    /// Link the request token with the consumer's enumeration token.
    pub fn link(request: &CancellationToken, enumeration: &CancellationToken) -> Self {
        let token = request.child_token();
        let target = token.clone();
        let enumeration = enumeration.clone();
        let forwarder = tokio::spawn(async move {
            enumeration.cancelled().await;
            target.cancel();
        });
        Self {
            token,
            forwarder: Some(forwarder),
        }
    }

    /// Use a single token directly; no link is allocated.
    pub fn passthrough(token: CancellationToken) -> Self {
        Self {
            token,
            forwarder: None,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for LinkedToken {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn items(values: Vec<i32>) -> BuildFn<i32> {
        Box::new(move |_| Box::pin(futures::stream::iter(values.into_iter().map(Ok))))
    }

    #[tokio::test]
    async fn test_nothing_runs_until_first_poll() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let build: BuildFn<i32> = Box::new(move |_| {
            flag.store(true, Ordering::SeqCst);
            Box::pin(futures::stream::empty())
        });

        let mut stream = DispatchStream::new(build);
        assert!(!started.load(Ordering::SeqCst));

        assert!(stream.next().await.is_none());
        assert!(started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_enumeration_token_reaches_build() {
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let build: BuildFn<i32> = Box::new(move |enumeration| {
            let _ = seen_tx.send(enumeration.is_some());
            Box::pin(futures::stream::empty())
        });

        let mut stream = DispatchStream::new(build).with_cancellation(CancellationToken::new());
        assert!(stream.next().await.is_none());
        assert!(seen_rx.recv().unwrap());
    }

    #[tokio::test]
    async fn test_attach_after_start_is_ignored() {
        let mut stream = DispatchStream::new(items(vec![1, 2]));
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);

        let mut stream = stream.with_cancellation(CancellationToken::new());
        assert_eq!(stream.next().await.unwrap().unwrap(), 2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_linked_token_observes_both_parents() {
        let request = CancellationToken::new();
        let enumeration = CancellationToken::new();

        let link = LinkedToken::link(&request, &enumeration);
        assert!(!link.token().is_cancelled());

        enumeration.cancel();
        link.token().cancelled().await;
        assert!(link.token().is_cancelled());
        // The request token is a parent, not a child: it stays live.
        assert!(!request.is_cancelled());

        let request = CancellationToken::new();
        let link = LinkedToken::link(&request, &CancellationToken::new());
        request.cancel();
        link.token().cancelled().await;
        assert!(link.token().is_cancelled());
    }
}
