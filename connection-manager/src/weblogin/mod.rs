//! Web-login bridge.
//!
//! Some backends only authenticate through their own web pages. The gateway
//! then reverse-proxies the browser through the backend's login domain:
//!
//! ```text
//! browser ── GET /api/system/v1/weblogin/{instance}/login ──▶ gateway
//!         ◀─ 302 to auth path, Set-Cookie InstanceCode={instance}
//! browser ── any path + InstanceCode cookie ──▶ gateway ──▶ backend login domain
//!         ◀─ rewritten response ─────────────── gateway ◀──
//!                                  completion page reached?
//!                                  └─▶ init_from_web_login, context Connected
//! ```
//!
//! Redirects are never followed by the gateway: the browser follows them,
//! through the gateway, so every hop is observed.

pub mod rewrite;

use crate::api::AppError;
use crate::context::ConnectionContext;
use crate::error::GatewayError;
use crate::registry::ConnectionRegistry;
use anyhow::Context as _;
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::sync::Arc;
use sysgate::config::WebLoginConfig;
use tracing::{debug, error, info, warn};
use url::Url;

use rewrite::*;

#[derive(Clone)]
pub struct WebLoginState {
    registry: Arc<ConnectionRegistry>,
    client: reqwest::Client,
    cookie_name: String,
    body_limit: usize,
}

impl WebLoginState {
    pub fn new(registry: Arc<ConnectionRegistry>, config: &WebLoginConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to build web-login proxy client")?;

        Ok(Self {
            registry,
            client,
            cookie_name: config.cookie_name.clone(),
            body_limit: config.body_limit_bytes,
        })
    }

    fn context_for(&self, instance: &str) -> Result<Arc<ConnectionContext>, GatewayError> {
        self.registry
            .find_by_instance(instance)
            .ok_or_else(|| GatewayError::Validation(format!("Connection context not found : {}", instance)))
    }
}

/// Parses the adapter's login URL.
async fn auth_target(context: &ConnectionContext) -> Result<Url, GatewayError> {
    let auth_url = context.auth_url().await;
    Url::parse(&auth_url).map_err(|_| GatewayError::Validation(format!("Bad authentication url : {}", auth_url)))
}

/// Entry point handed to the browser by a connect request.
async fn login_entry(
    State(state): State<WebLoginState>,
    Path(instance): Path<String>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let context = state.context_for(&instance)?;
    let target = auth_target(&context).await?;

    let mut location = target.path().to_string();
    if let Some(query) = target.query() {
        location.push('?');
        location.push_str(query);
    }

    let cookie = Cookie::build((state.cookie_name.clone(), instance))
        .http_only(true)
        .secure(true)
        .path("/");

    info!(
        user = %context.username(),
        connection = %context.connection_code(),
        location = %location,
        "Starting web login"
    );

    Ok((StatusCode::FOUND, jar.add(cookie), [(header::LOCATION, location)]).into_response())
}

/// Catch-all: forwards requests carrying the instance cookie to the backend.
async fn proxy(State(state): State<WebLoginState>, jar: CookieJar, request: Request) -> Result<Response, AppError> {
    let Some(instance) = jar.get(&state.cookie_name).map(|c| c.value().to_string()) else {
        warn!(uri = %request.uri(), "Called without cookie");
        return Err(GatewayError::NotFound(format!("No route for {}", request.uri().path())).into());
    };

    let context = state.context_for(&instance)?;
    let target = auth_target(&context).await?;

    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let gateway_host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let mut forward = target.clone();
    forward.set_path(&path);
    forward.set_query(parts.uri.query());

    let mut headers = parts.headers.clone();
    debug!(method = %parts.method, url = %forward, headers = %dump_headers(&headers), "Proxy request");
    strip_request_cookie(&mut headers, &state.cookie_name);
    remap_request_headers(&mut headers, &target);
    headers.remove(header::CONTENT_LENGTH);
    debug!(headers = %dump_headers(&headers), "Proxy request (remapped)");

    let body = to_bytes(body, state.body_limit)
        .await
        .map_err(|e| GatewayError::Validation(format!("Cannot read request body: {}", e)))?;

    let upstream = state
        .client
        .request(parts.method.clone(), forward.as_str())
        .headers(headers.clone())
        .body(body)
        .send()
        .await
        .map_err(GatewayError::from)?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    let cookies = response_cookies(&response_headers);
    let body = upstream.bytes().await.map_err(GatewayError::from)?;

    debug!(status = %status, headers = %dump_headers(&response_headers), "Proxy response");
    remap_response_headers(&mut response_headers, target.scheme(), &gateway_host);
    debug!(headers = %dump_headers(&response_headers), "Proxy response (remapped)");

    if context.is_web_login_completed(status.as_u16(), &path).await {
        if let Some(page) = finish_login(&state, &context, &headers, &cookies).await {
            response_headers.remove(header::CONTENT_LENGTH);
            response_headers.remove(header::CONTENT_ENCODING);
            response_headers.remove(header::LOCATION);
            response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
            return Ok(build_response(StatusCode::OK, response_headers, Body::from(page)));
        }
    }

    response_headers.remove(header::CONTENT_LENGTH);
    Ok(build_response(status, response_headers, Body::from(body)))
}

/// Completes a pending login and returns the page replacing the backend's.
///
/// `None` when the context had no pending login: the response passes through.
async fn finish_login(
    state: &WebLoginState,
    context: &ConnectionContext,
    request_headers: &HeaderMap,
    cookies: &[Cookie<'static>],
) -> Option<String> {
    match context.complete_web_login(request_headers, cookies).await {
        Ok(false) => None,
        Ok(true) => {
            state.registry.announce(context).await;
            Some(login_page_html("Success", "This page can be closed"))
        }
        Err(e) => {
            error!(
                user = %context.username(),
                connection = %context.connection_code(),
                error = %e,
                "Web login failed"
            );
            state.registry.announce(context).await;
            Some(login_page_html("Authentication failed", &format!("Cause: {}", e)))
        }
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Login entry route plus the catch-all proxy.
pub fn create_router(state: WebLoginState) -> Router {
    Router::new()
        .route("/api/system/v1/weblogin/:instance/login", get(login_entry))
        .fallback(proxy)
        .with_state(state)
}
