//! Inspection middleware.
//! Wires the policy store, transaction, body relay and response
//! interceptor into one axum middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body::Body as _;
use http_body_util::BodyExt;

use crate::observability::metrics;
use crate::waf::policy::InspectionPolicy;
use crate::waf::request_body;
use crate::waf::response::{ResponseInterceptor, ResponseSink, ResponseWriter};
use crate::waf::transaction::{protocol_name, Phase, TransactionController};
use crate::waf::{Waf, WafError};

/// Inspect one request/response exchange.
///
/// Mount with `axum::middleware::from_fn_with_state(Arc<Waf>, inspect)`.
pub async fn inspect(State(waf): State<Arc<Waf>>, request: Request, next: Next) -> Response {
    let policy = waf.policies().ensure_registered(request.uri().path());
    if !policy.enabled {
        metrics::record_bypass("policy_disabled");
        return next.run(request).await;
    }

    let mut ctl = TransactionController::open(waf.engine());
    if ctl.is_rule_engine_off() {
        metrics::record_bypass("engine_off");
        return next.run(request).await;
    }

    tracing::debug!(
        transaction_id = %ctl.id(),
        method = %request.method(),
        path = %request.uri().path(),
        "Inspecting request"
    );

    match run(&mut ctl, &policy, request, next).await {
        Ok(response) => {
            metrics::record_transaction("allowed");
            response
        }
        Err(e) => {
            metrics::record_transaction(match &e {
                WafError::Interrupted { .. } => "blocked",
                _ => "failed",
            });
            e.into_response()
        }
    }
}

async fn run(
    ctl: &mut TransactionController,
    policy: &InspectionPolicy,
    request: Request,
    next: Next,
) -> Result<Response, WafError> {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let host = request_host(&request);
    let (parts, body) = request.into_parts();

    ctl.process_connection(&remote_addr, &host)?;
    ctl.process_uri(&parts.uri, &parts.method, parts.version)?;

    if policy.check_request_headers {
        ctl.process_request_headers(&parts.headers, &host)?;
    }

    let body = if policy.check_request_body && ctl.is_request_body_accessible() {
        let body = if body.is_end_stream() {
            body
        } else {
            request_body::relay(ctl, body).await?
        };
        ctl.process_request_body()?;
        body
    } else {
        body
    };

    let head_request = parts.method == Method::HEAD;
    let response = next.run(Request::from_parts(parts, body)).await;

    if !policy.inspects_response() {
        return Ok(response);
    }

    let protocol = protocol_name(response.version());
    if !policy.check_response_body {
        ctl.process_response_headers(response.status(), response.headers(), protocol)?;
        return Ok(response);
    }

    intercept_response(ctl, policy, response, protocol, head_request).await
}

/// Pump the handler's body through the interceptor, then emit the
/// engine's copy of it.
async fn intercept_response(
    ctl: &mut TransactionController,
    policy: &InspectionPolicy,
    response: Response,
    protocol: &'static str,
    head_request: bool,
) -> Result<Response, WafError> {
    let (parts, mut body) = response.into_parts();
    let sink = ResponseSink::new(parts).for_head(head_request);
    let mut writer = ResponseInterceptor::new(sink, ctl, policy, protocol);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| WafError::Body {
            phase: Phase::ResponseBody,
            source,
        })?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        writer.write(&data)?;
        if writer.is_interrupted() {
            break;
        }
    }

    // Empty bodies never hit the write path; inspect their headers anyway.
    if policy.check_response_headers {
        writer.process_response_headers()?;
    }

    let redirected = writer.is_body_redirected();
    tracing::trace!(
        status = writer.status().as_u16(),
        size = writer.size(),
        redirected,
        "Handler response intercepted"
    );
    let mut sink = writer.into_inner();

    ctl.ensure_not_interrupted()?;
    if !redirected {
        return Ok(sink.into_response());
    }

    if ctl.is_response_body_accessible() && ctl.is_response_body_processable() {
        ctl.process_response_body()?;
    }
    let payload = ctl.response_body_reader()?;
    sink.write(&payload)?;
    Ok(sink.into_response())
}

/// Host the client addressed: the Host header, else the URI authority.
fn request_host(request: &Request<Body>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}
