//! Request middleware: token presence, assistant rate limits, access log.
//!
//! Middleware reads [`AppState`] from request extensions, so the
//! `Extension` layer has to sit outside every layer in this module.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::{AppState, Limit};

/// The bearer token sent with a request. Never verified, only required.
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// Reject requests without a bearer token; expose the token to handlers.
pub async fn require_token(mut req: Request<Body>, next: Next) -> Response {
    match bearer_token(&req) {
        Some(token) => {
            req.extensions_mut().insert(AccessToken(token));
            next.run(req).await
        }
        None => ApiError::token_required().into_response(),
    }
}

pub async fn limit_ask(req: Request<Body>, next: Next) -> Response {
    limit(Limit::Ask, req, next).await
}

pub async fn limit_suggestions(req: Request<Body>, next: Next) -> Response {
    limit(Limit::Suggestions, req, next).await
}

async fn limit(kind: Limit, req: Request<Body>, next: Next) -> Response {
    match check_limit(kind, &req) {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

fn check_limit(kind: Limit, req: &Request<Body>) -> Result<(), ApiError> {
    let state = req
        .extensions()
        .get::<AppState>()
        .ok_or_else(|| ApiError::Internal("missing app state".into()))?;

    let key = req
        .extensions()
        .get::<AccessToken>()
        .map(|t| t.0.as_str())
        .unwrap_or("anonymous");

    let mut limiter = state
        .limiter(kind)
        .lock()
        .map_err(|_| ApiError::Internal("rate limiter lock poisoned".into()))?;

    limiter.check(key).map_err(|retry_after| {
        warn!(?kind, retry_after, "rate limit exceeded");
        ApiError::RateLimited { retry_after }
    })
}

/// Log method, path, status and latency for every request.
pub async fn access_log(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
