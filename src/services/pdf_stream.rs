//! Stream session: a rendered PDF delivered in chunks while the renderer
//! that produced it stays checked out.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::EngineError;
use crate::rendering::PdfByteStream;
use crate::services::pool::{Pooled, ResourceFactory};

/// How a stream session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The stream produced its last chunk
    Ended,
    /// The consumer dropped the stream before the end
    Closed,
    /// The stream yielded an error
    Errored,
}

/// PDF byte stream holding its renderer until the first terminal event.
///
/// Exactly one terminal event ends the lease: an error destroys the
/// renderer, a normal end or an early close returns it to the pool. The
/// error itself is yielded once, then the stream is fused.
pub struct PdfStream<F: ResourceFactory> {
    inner: PdfByteStream,
    lease: Option<Pooled<F>>,
    terminal: Option<TerminalEvent>,
}

// `inner` is already boxed and pinned; no field is structurally pinned.
impl<F: ResourceFactory> Unpin for PdfStream<F> {}

impl<F: ResourceFactory> PdfStream<F> {
    pub(crate) fn new(inner: PdfByteStream, lease: Pooled<F>) -> Self {
        Self {
            inner,
            lease: Some(lease),
            terminal: None,
        }
    }

    /// The terminal event, once one has fired
    pub fn terminal_event(&self) -> Option<TerminalEvent> {
        self.terminal
    }

    fn finish(&mut self, event: TerminalEvent) {
        if self.terminal.is_some() {
            return;
        }
        self.terminal = Some(event);

        let Some(lease) = self.lease.take() else {
            return;
        };
        tracing::debug!(id = lease.id(), event = ?event, "PDF stream finished");

        match event {
            TerminalEvent::Errored => lease.destroy_in_background(),
            TerminalEvent::Ended | TerminalEvent::Closed => lease.release_in_background(),
        }
    }
}

impl<F: ResourceFactory> Stream for PdfStream<F> {
    type Item = Result<Bytes, EngineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminal.is_some() {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "PDF stream failed");
                this.finish(TerminalEvent::Errored);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(TerminalEvent::Ended);
                Poll::Ready(None)
            }
        }
    }
}

impl<F: ResourceFactory> Drop for PdfStream<F> {
    fn drop(&mut self) {
        self.finish(TerminalEvent::Closed);
    }
}
