//! Streaming response transport
//!
//! Bridges a printer running on a blocking worker to an axum response. The
//! status line and headers are held back until the first body write (or
//! until the printer is dropped) and then handed to the handler. Body bytes
//! follow in chunks through a bounded channel, so a slow client applies
//! backpressure to the query instead of letting the body pile up in memory.

use std::convert::Infallible;
use std::io;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use super::types::ApiError;
use crate::core::constants::{STREAM_CHANNEL_CAPACITY, STREAM_CHUNK_BYTES};
use crate::domain::printer::Transport;

#[derive(Debug)]
struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
}

/// Printer side of a streamed response. Must be used off the async runtime.
pub struct StreamingTransport {
    head: ResponseHead,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::Sender<Result<Bytes, Infallible>>,
    buffer: Vec<u8>,
}

/// Handler side of a streamed response
pub struct PendingResponse {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::Receiver<Result<Bytes, Infallible>>,
}

impl StreamingTransport {
    pub fn channel() -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let transport = Self {
            head: ResponseHead {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
            },
            head_tx: Some(head_tx),
            body_tx,
            buffer: Vec::with_capacity(STREAM_CHUNK_BYTES),
        };
        (transport, PendingResponse { head_rx, body_rx })
    }

    fn commit(&mut self) -> io::Result<()> {
        let Some(head_tx) = self.head_tx.take() else {
            return Ok(());
        };
        let head = std::mem::replace(
            &mut self.head,
            ResponseHead {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
            },
        );
        head_tx.send(head).map_err(|_| disconnected())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(STREAM_CHUNK_BYTES),
        ));
        self.body_tx
            .blocking_send(Ok(chunk))
            .map_err(|_| disconnected())
    }
}

impl Transport for StreamingTransport {
    fn set_status(&mut self, status: u16) {
        if self.head_tx.is_none() {
            return;
        }
        match StatusCode::from_u16(status) {
            Ok(status) => self.head.status = status,
            Err(e) => tracing::warn!(status, error = %e, "Ignoring invalid status code"),
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.head_tx.is_none() {
            return;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.head.headers.insert(name, value);
            }
            _ => tracing::warn!(name, "Ignoring invalid response header"),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.commit()?;
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= STREAM_CHUNK_BYTES {
            self.flush()?;
        }
        Ok(())
    }
}

impl Drop for StreamingTransport {
    fn drop(&mut self) {
        // Client may already be gone; nothing left to report to
        let _ = self.commit();
        let _ = self.flush();
    }
}

impl PendingResponse {
    /// Wait for the printer to commit the head, then stream the body
    pub async fn into_response(self) -> Result<Response, ApiError> {
        let head = self
            .head_rx
            .await
            .map_err(|_| ApiError::internal("Response ended before it started"))?;

        let mut response = Response::new(Body::from_stream(ReceiverStream::new(self.body_rx)));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        Ok(response)
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}
