use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gitvec_protocol::ErrorBody;

pub fn respond_err(status: u16, msg: impl Into<String>) -> Response {
    let body = ErrorBody { code: status, message: msg.into() };
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(body)).into_response()
}

pub fn from_core_error(err: gitvec_core::error::CoreError) -> Response {
    respond_err(err.http_status(), err.to_string())
}

#[allow(dead_code)]
pub fn empty_204() -> Response {
    Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap()
}
