//! `GET /iplookup` handler
//!
//! Responds as soon as the lookup is resolved. Registry sync for the matched
//! prefixes runs afterwards on the blocking pool and never affects the
//! response.

use crate::lens::lookup::LookupError;
use crate::server::ServerState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Query string of `/iplookup`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IpLookupQuery {
    pub ip: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn lookup_error_response(err: &LookupError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, err.to_string())
}

/// Handler for `GET /iplookup?ip=<literal>`
///
/// A query string that does not deserialize is answered with a JSON 400.
pub async fn iplookup_handler(
    State(state): State<ServerState>,
    query: Result<Query<IpLookupQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    let lens = state.lens.clone();
    let ip = query.ip;
    let resolved = tokio::task::spawn_blocking(move || lens.resolve(ip.as_deref())).await;

    match resolved {
        Ok(Ok(result)) => {
            let lens = state.lens.clone();
            let to_publish = result.clone();
            tokio::task::spawn_blocking(move || {
                lens.publish(&to_publish);
            });
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(Err(e)) => lookup_error_response(&e),
        Err(e) => {
            tracing::error!("Lookup task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
