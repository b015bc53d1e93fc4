//! The axum router (§6 "HTTP API"): a thin adapter translating verbs
//! and path segments into `ModuleRegistry::dispatch_http` calls. None of
//! the dispatch logic itself lives here — this module only knows about
//! axum's extractors.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use velbus_modules::{HttpMethod, ModuleError};

use crate::state::Daemon;
use crate::ws::module_state_ws;

pub fn build_router(daemon: Daemon) -> Router {
    Router::new()
        .route("/timestamp", get(timestamp))
        .route("/module", delete(flush_all))
        .route("/module/:addr", get(dispatch_root).put(dispatch_root).post(dispatch_root).patch(dispatch_root).delete(evict_one))
        .route(
            "/module/:addr/*rest",
            get(dispatch_rest).put(dispatch_rest).post(dispatch_rest).patch(dispatch_rest).delete(dispatch_rest),
        )
        .route("/module_state", get(module_state_ws))
        .with_state(daemon)
        .layer(TraceLayer::new_for_http())
}

async fn timestamp() -> Json<Value> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Json(json!(now.as_secs_f64()))
}

async fn flush_all(State(daemon): State<Daemon>) -> impl IntoResponse {
    daemon.registry.forget(None).await;
    daemon.ws_hub.broadcast_flush();
    StatusCode::NO_CONTENT
}

fn parse_address(addr: &str) -> Result<u8, ModuleError> {
    u8::from_str_radix(addr, 16).map_err(|_| ModuleError::BadRequest("address must be hex".into()))
}

async fn evict_one(State(daemon): State<Daemon>, Path(addr): Path<String>) -> Response {
    match parse_address(&addr) {
        Ok(address) => {
            daemon.registry.forget(Some(address)).await;
            daemon.ws_hub.notify_evicted(address);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn dispatch_root(
    State(daemon): State<Daemon>,
    Path(addr): Path<String>,
    method: Method,
    body: Option<Json<Value>>,
) -> Response {
    dispatch(daemon, addr, Vec::new(), method, body).await
}

async fn dispatch_rest(
    State(daemon): State<Daemon>,
    Path((addr, rest)): Path<(String, String)>,
    method: Method,
    body: Option<Json<Value>>,
) -> Response {
    let segments = rest.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
    dispatch(daemon, addr, segments, method, body).await
}

async fn dispatch(
    daemon: Daemon,
    addr: String,
    path: Vec<String>,
    method: Method,
    body: Option<Json<Value>>,
) -> Response {
    let address = match parse_address(&addr) {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };
    let Some(method) = to_http_method(&method) else {
        return (StatusCode::METHOD_NOT_ALLOWED, "unsupported method").into_response();
    };
    match daemon
        .registry
        .dispatch_http(address, method, &path, body.map(|Json(v)| v))
        .await
    {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::OK);
            let mut response = (status, Json(resp.body)).into_response();
            if let Some(age) = resp.age_seconds {
                response
                    .headers_mut()
                    .insert("Age", age.to_string().parse().expect("age is always a valid header value"));
            }
            response
        }
        Err(e) => error_response(e),
    }
}

fn to_http_method(method: &Method) -> Option<HttpMethod> {
    match *method {
        Method::GET => Some(HttpMethod::Get),
        Method::PUT => Some(HttpMethod::Put),
        Method::POST => Some(HttpMethod::Post),
        Method::PATCH => Some(HttpMethod::Patch),
        Method::DELETE => Some(HttpMethod::Delete),
        _ => None,
    }
}

fn error_response(err: ModuleError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(json!({"error": err.to_string()}))).into_response();
    if let ModuleError::CachedTimeout { at } = &err {
        let age = at.elapsed().as_secs();
        response
            .headers_mut()
            .insert("Age", age.to_string().parse().expect("age is always a valid header value"));
    }
    response
}
