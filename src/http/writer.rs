//! Asynchronous response writer.
//!
//! # Responsibilities
//! - Give the pipeline a handle it can write through long after the
//!   event callback returned (comet / long-poll)
//! - Enqueue without waiting for the socket
//! - Turn the queued frames back into an HTTP response on the transport side
//!
//! # Data Flow
//! ```text
//! pipeline ── write / write_error / close ──▶ ResponseWriter
//!                                                │ unbounded mpsc (call order)
//!                                                ▼
//!                                           FrameStream ──▶ hyper body
//! ```
//!
//! # Design Decisions
//! - One writer per inbound event; it is not `Clone`
//! - Enqueue order is flush order
//! - `close` flips a local flag, so closing twice is harmless regardless
//!   of what the transport does
//! - A status written after body bytes cannot be rolled back; the body is
//!   aborted instead

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use futures_util::stream;
use hyper::ext::ReasonPhrase;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::net::{ConnectionGuard, ConnectionId};
use crate::observability::metrics;

/// Errors surfaced to the pipeline by a [`ResponseWriter`].
#[derive(Debug, Error)]
pub enum WriterError {
    /// The writer was closed, or the client went away.
    #[error("connection closed")]
    Closed,

    /// The capability exists on the contract but this adapter does not provide it.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),

    /// `write_error` was given something that is not an HTTP status code.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
}

impl WriterError {
    /// True when the failure means "feature not available" rather than a runtime error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, WriterError::Unsupported(_))
    }
}

/// One unit of output queued for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Response body bytes.
    Data(Bytes),
    /// A status-line-only response.
    Status { code: StatusCode, message: String },
    /// End of the response; the connection may be torn down.
    Close,
}

impl Frame {
    fn kind(&self) -> &'static str {
        match self {
            Frame::Data(_) => "data",
            Frame::Status { .. } => "status",
            Frame::Close => "close",
        }
    }
}

/// Handle bound to one live connection.
///
/// Every method returns immediately; bytes are handed to the transport
/// in the order the calls were made.
#[derive(Debug)]
pub struct ResponseWriter {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Frame>,
    closed: AtomicBool,
}

impl ResponseWriter {
    /// Create a writer and the transport-side stream that drains it.
    pub fn channel(id: ConnectionId) -> (ResponseWriter, FrameStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = ResponseWriter {
            id,
            tx,
            closed: AtomicBool::new(false),
        };
        let frames = FrameStream {
            id,
            rx,
            pending: None,
            finished: false,
            guard: None,
        };
        (writer, frames)
    }

    /// ID of the connection this writer is bound to.
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue body bytes.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<(), WriterError> {
        self.enqueue(Frame::Data(data.into()))
    }

    /// Enqueue a UTF-8 string as body bytes.
    pub fn write_str(&self, data: &str) -> Result<(), WriterError> {
        self.write(Bytes::copy_from_slice(data.as_bytes()))
    }

    /// Enqueue a status-line-only response.
    ///
    /// Only meaningful before any body bytes; afterwards the transport
    /// aborts the stream.
    pub fn write_error(&self, code: u16, message: &str) -> Result<(), WriterError> {
        let code = StatusCode::from_u16(code).map_err(|_| WriterError::InvalidStatus(code))?;
        self.enqueue(Frame::Status {
            code,
            message: message.to_owned(),
        })
    }

    /// Redirects are not available on this transport.
    pub fn redirect(&self, location: &str) -> Result<(), WriterError> {
        tracing::debug!(connection_id = %self.id, location, "Redirect requested on comet writer");
        Err(WriterError::Unsupported("redirect"))
    }

    /// Terminate the response. Safe to call more than once.
    pub fn close(&self) -> Result<(), WriterError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        metrics::record_frame(Frame::Close.kind());
        // The receiver may already be gone; the connection is closed either way.
        let _ = self.tx.send(Frame::Close);
        Ok(())
    }

    /// True once `close` was called or the transport stopped listening.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn enqueue(&self, frame: Frame) -> Result<(), WriterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriterError::Closed);
        }
        let kind = frame.kind();
        self.tx.send(frame).map_err(|_| WriterError::Closed)?;
        metrics::record_frame(kind);
        Ok(())
    }
}

/// Transport side of a [`ResponseWriter`].
#[derive(Debug)]
pub struct FrameStream {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Frame>,
    pending: Option<Bytes>,
    finished: bool,
    guard: Option<ConnectionGuard>,
}

impl FrameStream {
    /// Keep `guard` alive until the response body ends.
    ///
    /// A shutdown requested through the guard's tracker ends the stream as
    /// if the pipeline had closed it.
    pub fn with_guard(mut self, guard: ConnectionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Wait for the next queued frame. `None` once every writer handle is gone.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Stop accepting frames and drop whatever is still queued.
    ///
    /// Later writes on the paired writer fail with [`WriterError::Closed`].
    pub fn abort(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.finished = true;
        dropped
    }

    /// Build the HTTP response from the first frame, streaming the rest.
    ///
    /// Waits (asynchronously) for the pipeline's first output, which may
    /// arrive long after the event handler's call into the pipeline returned.
    pub async fn into_response(mut self) -> Response {
        match self.recv().await {
            Some(Frame::Status { code, message }) => {
                tracing::debug!(
                    connection_id = %self.id,
                    status = %code,
                    "Status-only response"
                );
                status_only(code, &message)
            }
            Some(Frame::Data(first)) => {
                self.pending = Some(first);
                let body = stream::unfold(self, |mut frames| async move {
                    frames.next_chunk().await.map(|chunk| (chunk, frames))
                });
                Response::new(Body::from_stream(body))
            }
            Some(Frame::Close) | None => Response::new(Body::empty()),
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, io::Error>> {
        if let Some(chunk) = self.pending.take() {
            return Some(Ok(chunk));
        }
        if self.finished {
            return None;
        }
        match self.recv().await {
            Some(Frame::Data(chunk)) => Some(Ok(chunk)),
            Some(Frame::Status { code, .. }) => {
                tracing::warn!(
                    connection_id = %self.id,
                    status = %code,
                    "Status written after body bytes; aborting response"
                );
                self.finished = true;
                self.rx.close();
                Some(Err(io::Error::other(format!(
                    "status {code} written after response body started"
                ))))
            }
            Some(Frame::Close) | None => {
                self.finished = true;
                None
            }
        }
    }

    /// Next queued frame, or `Close` once the server asked streams to finish.
    async fn recv(&mut self) -> Option<Frame> {
        let Some(guard) = self.guard.as_mut() else {
            return self.rx.recv().await;
        };
        // Queued frames win over shutdown so they still get flushed.
        tokio::select! {
            biased;
            frame = self.rx.recv() => return frame,
            () = guard.shutdown_requested() => {}
        }
        tracing::debug!(connection_id = %self.id, "Server shutting down; ending stream");
        self.rx.close();
        Some(Frame::Close)
    }
}

/// Empty response carrying only a status line; the connection closes after it.
pub fn status_only(code: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = code;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    if !message.is_empty() {
        match ReasonPhrase::try_from(message.to_owned()) {
            Ok(reason) => {
                response.extensions_mut().insert(reason);
            }
            Err(_) => {
                tracing::debug!(status = %code, "Reason phrase rejected; using canonical text")
            }
        }
    }
    response
}
