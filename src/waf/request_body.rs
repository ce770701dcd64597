//! Request body relay.
//!
//! # Data Flow
//! ```text
//! original body ──frames──▶ engine buffer (up to its limit)
//!                                │
//! handler ◀── BufferedBody = [buffered prefix][unaccepted rest of last chunk][unread tail]
//! ```
//!
//! # Design Decisions
//! - Reading stops at the first short write, so bodies larger than the
//!   engine limit are never held in memory in full
//! - The tail is the original stream itself, handed over without copying
//! - Trailers seen while buffering are replayed after the data

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;

use crate::waf::transaction::{Phase, TransactionController};
use crate::waf::WafError;

/// Stream `body` into the engine, then rebuild a body for the handler.
///
/// Fails on an interruption raised while buffering, on an engine error, or
/// when the client body itself errors. The caller still runs the
/// request-body phase afterwards.
pub async fn relay(ctl: &mut TransactionController, mut body: Body) -> Result<Body, WafError> {
    let mut pending: Option<Frame<Bytes>> = None;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| WafError::Body {
            phase: Phase::RequestBody,
            source,
        })?;

        let data = match frame.into_data() {
            Ok(data) => data,
            Err(trailers) => {
                pending = Some(trailers);
                break;
            }
        };
        if data.is_empty() {
            continue;
        }

        let accepted = ctl.write_request_body(&data)?;
        if accepted < data.len() {
            tracing::debug!(
                transaction_id = %ctl.id(),
                accepted,
                chunk = data.len(),
                "Request body limit reached, relaying remainder unbuffered"
            );
            pending = Some(Frame::data(data.slice(accepted..)));
            break;
        }
    }

    let prefix = ctl.request_body_reader()?;
    Ok(Body::new(BufferedBody::new(prefix, pending, body)))
}

pin_project! {
    /// Buffered prefix followed by whatever the original stream still holds.
    pub struct BufferedBody<B> {
        prefix: Option<Bytes>,
        pending: Option<Frame<Bytes>>,
        #[pin]
        tail: B,
    }
}

impl<B> BufferedBody<B> {
    pub fn new(prefix: Bytes, pending: Option<Frame<Bytes>>, tail: B) -> Self {
        Self {
            prefix: Some(prefix).filter(|p| !p.is_empty()),
            pending,
            tail,
        }
    }
}

impl<B> http_body::Body for BufferedBody<B>
where
    B: http_body::Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if let Some(prefix) = this.prefix.take() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }
        if let Some(frame) = this.pending.take() {
            return Poll::Ready(Some(Ok(frame)));
        }
        this.tail.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_none() && self.pending.is_none() && self.tail.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = self.prefix.as_ref().map_or(0, |p| p.len() as u64)
            + self
                .pending
                .as_ref()
                .and_then(|f| f.data_ref())
                .map_or(0, |d| d.len() as u64);

        let tail = self.tail.size_hint();
        let mut hint = SizeHint::new();
        hint.set_lower(buffered + tail.lower());
        if let Some(upper) = tail.upper() {
            hint.set_upper(buffered + upper);
        }
        hint
    }
}
