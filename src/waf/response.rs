//! Response interception.
//!
//! # Data Flow
//! ```text
//! handler body frames
//!     → ResponseInterceptor::write
//!         → header gate (once): response headers into the engine
//!         → body inspection on:  engine accumulator
//!         → body inspection off: ResponseSink
//!     → after the handler: engine's assembled body → ResponseSink
//!     → ResponseSink::into_response → client
//! ```
//!
//! # Design Decisions
//! - A single idempotent gate runs before any byte leaves the decorator
//! - Suppressed writes report 0 bytes and are not counted in `size()`
//! - `status()` reports the interruption status once one exists

use axum::body::Body;
use axum::http::{header, response::Parts, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::BytesMut;

use crate::engine::Interruption;
use crate::waf::policy::InspectionPolicy;
use crate::waf::transaction::TransactionController;
use crate::waf::WafError;

/// The writer capabilities the interceptor needs from the real response.
pub trait ResponseWriter {
    fn header(&self) -> &HeaderMap;

    fn status(&self) -> StatusCode;

    /// Commit status and headers. Idempotent.
    fn write_header_now(&mut self);

    fn write(&mut self, data: &[u8]) -> Result<usize, WafError>;

    fn write_str(&mut self, s: &str) -> Result<usize, WafError> {
        self.write(s.as_bytes())
    }

    /// Payload bytes accepted so far.
    fn size(&self) -> usize;
}

/// The real writer: holds the handler's response head and collects payload
/// until it is turned into the outgoing response.
#[derive(Debug)]
pub struct ResponseSink {
    parts: Parts,
    body: BytesMut,
    committed: bool,
    head_request: bool,
}

impl ResponseSink {
    pub fn new(parts: Parts) -> Self {
        Self {
            parts,
            body: BytesMut::new(),
            committed: false,
            head_request: false,
        }
    }

    /// Answering a HEAD request: the handler's framing headers describe a
    /// body that is never sent, so they are kept as they are.
    pub fn for_head(mut self, head_request: bool) -> Self {
        self.head_request = head_request;
        self
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Emit the collected payload. The body is a single known-length
    /// buffer, so any streaming framing from the handler is replaced.
    pub fn into_response(self) -> Response {
        let mut parts = self.parts;
        if !self.head_request {
            parts.headers.remove(header::TRANSFER_ENCODING);
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        Response::from_parts(parts, Body::from(self.body.freeze()))
    }
}

impl ResponseWriter for ResponseSink {
    fn header(&self) -> &HeaderMap {
        &self.parts.headers
    }

    fn status(&self) -> StatusCode {
        self.parts.status
    }

    fn write_header_now(&mut self) {
        self.committed = true;
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WafError> {
        self.write_header_now();
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn size(&self) -> usize {
        self.body.len()
    }
}

/// Decorator that inspects a response on its way to the real writer.
pub struct ResponseInterceptor<'a, W> {
    inner: W,
    ctl: &'a mut TransactionController,
    protocol: &'static str,
    headers_processed: bool,
    size: usize,
    check_headers: bool,
    redirect_body: bool,
}

impl<'a, W: ResponseWriter> ResponseInterceptor<'a, W> {
    pub fn new(
        inner: W,
        ctl: &'a mut TransactionController,
        policy: &InspectionPolicy,
        protocol: &'static str,
    ) -> Self {
        let redirect_body = policy.check_response_body && ctl.is_response_body_accessible();
        Self {
            inner,
            ctl,
            protocol,
            headers_processed: false,
            size: 0,
            check_headers: policy.check_response_headers,
            redirect_body,
        }
    }

    /// Whether writes go to the engine instead of the real writer.
    pub fn is_body_redirected(&self) -> bool {
        self.redirect_body
    }

    pub fn is_interrupted(&self) -> bool {
        self.ctl.is_interrupted()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Inspect response headers once; afterwards report the standing verdict.
    pub fn process_response_headers(&mut self) -> Result<Option<Interruption>, WafError> {
        if self.headers_processed || self.ctl.is_interrupted() {
            return Ok(self.ctl.interruption().cloned());
        }
        self.headers_processed = true;

        let status = self.inner.status();
        match self
            .ctl
            .process_response_headers(status, self.inner.header(), self.protocol)
        {
            Ok(()) => Ok(None),
            Err(WafError::Interrupted { interruption, .. }) => Ok(Some(interruption)),
            Err(e) => Err(e),
        }
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseInterceptor<'_, W> {
    fn header(&self) -> &HeaderMap {
        self.inner.header()
    }

    fn status(&self) -> StatusCode {
        self.ctl
            .interruption()
            .and_then(|it| StatusCode::from_u16(it.effective_status()).ok())
            .unwrap_or_else(|| self.inner.status())
    }

    fn write_header_now(&mut self) {
        self.inner.write_header_now();
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WafError> {
        if self.check_headers && self.process_response_headers()?.is_some() {
            return Ok(0);
        }
        self.inner.write_header_now();

        let written = if self.redirect_body {
            match self.ctl.write_response_body(data) {
                Ok(n) => n,
                Err(WafError::Interrupted { .. }) => return Ok(0),
                Err(e) => return Err(e),
            }
        } else {
            self.inner.write(data)?
        };

        self.size += written;
        Ok(written)
    }

    fn size(&self) -> usize {
        self.size
    }
}
