//! Gateway HTTP API.
//!
//! - `GET    /api/system/v1/adapters`: backends and their parameter schemas
//! - `GET    /api/system/v1/adapters/:code`
//! - `GET    /api/system/v1/connections`: the caller's connections
//! - `PUT    /api/system/v1/connections/:code`: connect
//! - `DELETE /api/system/v1/connections/:code`: disconnect
//! - `GET    /api/system/v1/connections/:code/{roots,accounts,orders,positions,bars/:symbol}`: services
//! - `POST   /api/system/v1/connections/:code/test`: raw backend call
//!
//! Web-login routes live in [`crate::weblogin`] and are merged in by
//! [`create_router`].

use crate::adapter::{Account, AdapterInfo, Instrument, PriceBars, RootSymbol};
use crate::context::{ConnectionContext, ConnectionDescriptor};
use crate::error::{GatewayError, UpstreamKind};
use crate::registry::{ConnectResponse, ConnectionRegistry, ConnectionSpec};
use crate::weblogin::{self, WebLoginState};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sysgate::auth::{Caller, CallerDirectory, TokenError};
use tower_http::cors::CorsLayer;
use tracing::warn;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ConnectionRegistry>,
    pub callers: Arc<CallerDirectory>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Optional `owner` query parameter: act on another user's connection (admins only).
#[derive(Debug, Default, Deserialize)]
pub struct OwnerQuery {
    pub owner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RootsQuery {
    #[serde(default)]
    pub filter: String,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BarsQuery {
    /// `YYYYMMDD`
    pub date: String,
    pub owner: Option<String>,
}

/// Request body for `POST /connections/:code/test`.
#[derive(Debug, Deserialize)]
pub struct TestServiceRequest {
    pub service: String,
    #[serde(default)]
    pub query: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn identify(state: &ApiState, headers: &HeaderMap) -> Result<Caller, AppError> {
    state.callers.identify(headers).map_err(AppError::from)
}

/// Connected context for a service call, after the ownership check.
fn service_context(
    state: &ApiState,
    headers: &HeaderMap,
    code: &str,
    owner: Option<&str>,
) -> Result<Arc<ConnectionContext>, AppError> {
    let caller = identify(state, headers)?;
    let username = caller
        .acting_as(owner)
        .map_err(|e| GatewayError::Forbidden(e.to_string()))?;
    Ok(state.registry.connected_context(username, code)?)
}

fn parse_date(value: &str) -> Result<NaiveDate, GatewayError> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| GatewayError::Validation(format!("Invalid date (expected YYYYMMDD): {}", value)))
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn list_adapters(State(state): State<Arc<ApiState>>) -> Json<Vec<&'static AdapterInfo>> {
    Json(state.registry.catalog().infos())
}

async fn get_adapter(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
) -> Result<Json<&'static AdapterInfo>, AppError> {
    state
        .registry
        .catalog()
        .find(&code)
        .map(|a| Json(a.info()))
        .ok_or_else(|| GatewayError::NotFound(format!("System not found: {}", code)).into())
}

async fn list_connections(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConnectionDescriptor>>, AppError> {
    let caller = identify(&state, &headers)?;
    Ok(Json(state.registry.connections(&caller.username)))
}

async fn connect(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(spec): Json<ConnectionSpec>,
) -> Result<Json<ConnectResponse>, AppError> {
    let caller = identify(&state, &headers)?;
    let response = state.registry.connect(&caller.username, &code, &spec).await?;
    Ok(Json(response))
}

async fn disconnect(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let caller = identify(&state, &headers)?;
    state.registry.disconnect(&caller.username, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn root_symbols(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    Query(query): Query<RootsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<RootSymbol>>, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.root_symbols(&query.filter).await?))
}

async fn root_symbol(
    State(state): State<Arc<ApiState>>,
    Path((code, root)): Path<(String, String)>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
) -> Result<Json<RootSymbol>, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.root_symbol(&root).await?))
}

async fn instruments(
    State(state): State<Arc<ApiState>>,
    Path((code, root)): Path<(String, String)>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Instrument>>, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.instruments(&root).await?))
}

async fn price_bars(
    State(state): State<Arc<ApiState>>,
    Path((code, symbol)): Path<(String, String)>,
    Query(query): Query<BarsQuery>,
    headers: HeaderMap,
) -> Result<Json<PriceBars>, AppError> {
    let date = parse_date(&query.date)?;
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.price_bars(&symbol, date).await?))
}

async fn accounts(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Account>>, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.accounts().await?))
}

async fn orders(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.orders().await?))
}

async fn positions(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(Json(context.positions().await?))
}

async fn test_service(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
    Json(request): Json<TestServiceRequest>,
) -> Result<String, AppError> {
    let context = service_context(&state, &headers, &code, query.owner.as_deref())?;
    Ok(context.test_service(&request.service, &request.query).await?)
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

pub enum AppError {
    Gateway(GatewayError),
    Auth(TokenError),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError::Gateway(e)
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::Auth(e)
    }
}

/// HTTP status for a domain error.
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
        GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        GatewayError::Upstream {
            kind: UpstreamKind::Timeout,
            ..
        } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::ExhaustedRetries(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::NotConnected(_) => StatusCode::CONFLICT,
        GatewayError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Gateway(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    warn!(status = %status, error = %e, "Request failed");
                }
                (status, e.to_string())
            }
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState, weblogin: WebLoginState) -> Router {
    let api = Router::new()
        .route("/api/system/v1/adapters", get(list_adapters))
        .route("/api/system/v1/adapters/:code", get(get_adapter))
        .route("/api/system/v1/connections", get(list_connections))
        .route("/api/system/v1/connections/:code", put(connect).delete(disconnect))
        .route("/api/system/v1/connections/:code/roots", get(root_symbols))
        .route("/api/system/v1/connections/:code/roots/:root", get(root_symbol))
        .route("/api/system/v1/connections/:code/roots/:root/instruments", get(instruments))
        .route("/api/system/v1/connections/:code/bars/:symbol", get(price_bars))
        .route("/api/system/v1/connections/:code/accounts", get(accounts))
        .route("/api/system/v1/connections/:code/orders", get(orders))
        .route("/api/system/v1/connections/:code/positions", get(positions))
        .route("/api/system/v1/connections/:code/test", post(test_service))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state));

    api.merge(weblogin::create_router(weblogin))
}
