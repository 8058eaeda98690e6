use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gitvec_core::projection::matrix::ProjectionMatrix;
use gitvec_protocol::{HealthResponse, MatrixStatsEntry, MultiplyRequest, MultiplyResponse, StatsResponse};

use crate::app_state::MatrixdState;
use crate::handlers::utils::respond_err;

pub async fn multiply_handler(State(state): State<Arc<MatrixdState>>, Json(req): Json<MultiplyRequest>) -> Response {
    let collection_path = Path::new(&req.collection_path);
    let matrix = match state.get(&req.collection_path) {
        Some(m) => m,
        None => {
            let matrix = match ProjectionMatrix::load_or_create(collection_path, req.vector.len(), &req.collection_path) {
                Ok(m) => m,
                Err(e) => return respond_err(e.http_status(), e.to_string()),
            };
            state.touch(req.collection_path.clone(), matrix.clone());
            matrix
        }
    };

    if matrix.rows != req.vector.len() {
        return respond_err(400, format!("dimension mismatch: expected {}, got {}", matrix.rows, req.vector.len()));
    }

    let result = matrix.multiply(&req.vector);
    Json(MultiplyResponse { result }).into_response()
}

pub async fn health_handler(State(state): State<Arc<MatrixdState>>) -> Response {
    Json(HealthResponse {
        status: "ok".to_string(),
        cached_matrices: state.matrices.len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
    .into_response()
}

pub async fn stats_handler(State(state): State<Arc<MatrixdState>>) -> Response {
    let entries = state
        .age_minutes()
        .into_iter()
        .map(|(collection, age_minutes)| MatrixStatsEntry { collection, age_minutes })
        .collect();
    Json(StatsResponse { cache_size: state.matrices.len(), entries }).into_response()
}

pub async fn shutdown_handler() -> Response {
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        std::process::exit(0);
    });
    axum::http::StatusCode::NO_CONTENT.into_response()
}
