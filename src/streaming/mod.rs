//! Streaming adapter
//!
//! One-shot accessors over the settled response body. The body can be read
//! once, through any one accessor; later reads fail with
//! [`FetchError::BodyAlreadyRead`]. Reading through the adapter does not
//! affect `HttpResponse` itself, which stays re-readable.

use crate::error::FetchError;
use crate::types::HttpResponse;
use bytes::Bytes;
use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};

const OCTET_STREAM: &str = "application/octet-stream";

/// Body bytes with their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Bytes,
    content_type: String,
}

impl Blob {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Single-read view of a response body.
#[derive(Debug)]
pub struct BodyStream {
    response: HttpResponse,
    consumed: AtomicBool,
}

impl BodyStream {
    pub fn new(response: HttpResponse) -> Self {
        Self {
            response,
            consumed: AtomicBool::new(false),
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn text(&self) -> Result<String, FetchError> {
        self.consume()?;
        Ok(self.response.text())
    }

    /// Content type from the response header, else sniffed from magic bytes,
    /// else `application/octet-stream`.
    pub fn blob(&self) -> Result<Blob, FetchError> {
        self.consume()?;
        let bytes = self.response.bytes();
        let content_type = self
            .response
            .content_type()
            .map(str::to_string)
            .or_else(|| infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| OCTET_STREAM.to_string());
        Ok(Blob {
            bytes,
            content_type,
        })
    }

    pub fn array_buffer(&self) -> Result<Bytes, FetchError> {
        self.consume()?;
        Ok(self.response.bytes())
    }

    /// The body as the chunks the transport received, in order.
    pub fn chunks(&self) -> Result<impl Stream<Item = Bytes> + Send + use<>, FetchError> {
        self.consume()?;
        let chunks: Vec<Bytes> = self.response.chunks().to_vec();
        Ok(async_stream::stream! {
            for chunk in chunks {
                yield chunk;
            }
        })
    }

    fn consume(&self) -> Result<(), FetchError> {
        if self.consumed.swap(true, Ordering::SeqCst) {
            return Err(FetchError::BodyAlreadyRead);
        }
        Ok(())
    }
}
