//! Timeout wrapper for backend response bodies.
//!
//! The gateway buffers the whole backend response before relaying it, so a
//! backend that stalls mid-body would otherwise hold the request forever.

use bytes::Bytes;
use http_body::{Body, Frame};
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, Sleep, sleep};

/// Boxed error produced by [`TimeoutBody`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Timeout configuration for reading a body.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum wait between two frames
    pub chunk_timeout: Duration,
    /// Maximum time for the entire body, `None` for no bound
    pub total_timeout: Option<Duration>,
}

impl TimeoutConfig {
    /// Create a new timeout configuration.
    pub fn new(chunk_timeout: Duration, total_timeout: Option<Duration>) -> Self {
        Self {
            chunk_timeout,
            total_timeout,
        }
    }
}

/// Body wrapper enforcing [`TimeoutConfig`].
///
/// Both clocks start on the first poll. The chunk clock is re-armed every
/// time the inner body yields a frame.
pub struct TimeoutBody<B> {
    inner: B,
    config: TimeoutConfig,
    chunk_deadline: Pin<Box<Sleep>>,
    total_deadline: Option<Pin<Box<Sleep>>>,
    started: bool,
}

impl<B> TimeoutBody<B> {
    /// Create a new timeout-wrapped body.
    pub fn new(inner: B, config: TimeoutConfig) -> Self {
        let total_deadline = config.total_timeout.map(|d| Box::pin(sleep(d)));
        Self {
            inner,
            chunk_deadline: Box::pin(sleep(config.chunk_timeout)),
            total_deadline,
            config,
            started: false,
        }
    }

    /// Get a reference to the timeout configuration.
    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }
}

/// Which clock expired while reading a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BodyTimeout {
    /// No frame arrived within the per-chunk bound
    #[error("Chunk timeout exceeded ({after:?})")]
    Chunk { after: Duration },

    /// The whole body took longer than the total bound
    #[error("Total body timeout exceeded ({after:?})")]
    Total { after: Duration },
}

impl BodyTimeout {
    /// The bound that expired.
    pub fn after(&self) -> Duration {
        match self {
            BodyTimeout::Chunk { after } | BodyTimeout::Total { after } => *after,
        }
    }
}

/// The [`BodyTimeout`] behind `err`, if an expired clock produced it.
pub fn body_timeout<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a BodyTimeout> {
    err.downcast_ref::<BodyTimeout>()
}

impl<B> Body for TimeoutBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        if !this.started {
            this.started = true;
            let now = Instant::now();
            this.chunk_deadline
                .as_mut()
                .reset(now + this.config.chunk_timeout);
            if let (Some(deadline), Some(total)) =
                (this.total_deadline.as_mut(), this.config.total_timeout)
            {
                deadline.as_mut().reset(now + total);
            }
        }

        if let Some(deadline) = this.total_deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                let after = this.config.total_timeout.unwrap_or_default();
                return Poll::Ready(Some(Err(BodyTimeout::Total { after }.into())));
            }
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                let next = Instant::now() + this.config.chunk_timeout;
                this.chunk_deadline.as_mut().reset(next);
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e.into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => {
                if this.chunk_deadline.as_mut().poll(cx).is_ready() {
                    let after = this.config.chunk_timeout;
                    Poll::Ready(Some(Err(BodyTimeout::Chunk { after }.into())))
                } else {
                    Poll::Pending
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}
