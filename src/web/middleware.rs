//! Visit tracking middleware
//!
//! Every request that is not a static asset is handed to the [`Tracker`] on
//! a background task before the inner service runs. The response never
//! waits on, or depends on, the tracking outcome.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header::USER_AGENT, HeaderMap, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::{net::SocketAddr, sync::Arc, task::{Context, Poll}};
use tower::{Layer, Service};

use crate::tracking::{is_static_asset, TrackedRequest, Tracker, PLACEHOLDER_SESSION_KEY};

/// Get the client address used as the session key.
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
pub fn session_key(headers: &HeaderMap, peer: Option<&str>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        // Try X-Real-IP first (set by Caddy/nginx)
        if let Some(real_ip) = headers.get("x-real-ip") {
            if let Ok(ip) = real_ip.to_str() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }

        // Try X-Forwarded-For (may contain chain of IPs, first is original client)
        if let Some(forwarded) = headers.get("x-forwarded-for") {
            if let Ok(ips) = forwarded.to_str() {
                if let Some(first_ip) = ips.split(',').next() {
                    let ip = first_ip.trim();
                    if !ip.is_empty() {
                        return ip.to_string();
                    }
                }
            }
        }
    }

    peer.unwrap_or(PLACEHOLDER_SESSION_KEY).to_string()
}

/// Layer for visit tracking
#[derive(Clone)]
pub struct TrackingLayer {
    tracker: Arc<Tracker>,
    trust_proxy_headers: bool,
}

impl TrackingLayer {
    pub fn new(tracker: Arc<Tracker>, trust_proxy_headers: bool) -> Self {
        Self { tracker, trust_proxy_headers }
    }
}

impl<S> Layer<S> for TrackingLayer {
    type Service = TrackingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrackingMiddleware {
            inner,
            tracker: self.tracker.clone(),
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }
}

/// Middleware service for visit tracking
#[derive(Clone)]
pub struct TrackingMiddleware<S> {
    inner: S,
    tracker: Arc<Tracker>,
    trust_proxy_headers: bool,
}

impl<S> Service<Request<Body>> for TrackingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let path = request.uri().path();

        if !is_static_asset(path) {
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string());
            let tracked = TrackedRequest {
                path: path.to_string(),
                session_key: session_key(request.headers(), peer.as_deref(), self.trust_proxy_headers),
                user_agent: request
                    .headers()
                    .get(USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            };

            let tracker = self.tracker.clone();
            tokio::spawn(async move {
                tracker.track(tracked).await;
            });
        }

        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}
