//! Completion handles returned by the send worker.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::PxsError;

pub type SendResult = Result<(), PxsError>;

/// Resolves once the worker has executed (or rejected) a request.
///
/// Dropping it does not cancel the request.
#[must_use = "a SendFuture reports whether the request was delivered"]
#[derive(Debug)]
pub struct SendFuture {
    state: State,
}

#[derive(Debug)]
enum State {
    Ready(Option<SendResult>),
    Waiting(oneshot::Receiver<SendResult>),
}

impl SendFuture {
    /// Already resolved, e.g. a request rejected at enqueue time.
    pub fn ready(result: SendResult) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    pub(crate) fn pending() -> (Promise, Self) {
        let (tx, rx) = oneshot::channel();
        (
            Promise(tx),
            Self {
                state: State::Waiting(rx),
            },
        )
    }
}

impl Future for SendFuture {
    type Output = SendResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or(Err(PxsError::Other("SendFuture polled after completion".into()))),
            ),
            // the worker dropped the promise without answering
            State::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|r| r.unwrap_or(Err(PxsError::WorkerStopped))),
        }
    }
}

/// Write side of a [`SendFuture`]. Consumed on resolution.
#[derive(Debug)]
pub(crate) struct Promise(oneshot::Sender<SendResult>);

impl Promise {
    pub fn resolve(self, result: SendResult) {
        // receiver may have been dropped
        let _ = self.0.send(result);
    }
}
