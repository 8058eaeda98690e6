//! The job-queue/query daemon: serves one checked-out repository and its
//! collection, configured by environment rather than per-request so a
//! single process can be supervised like any other local service.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use gitvec_server::app_state::ApidState;
use gitvec_server::handlers::apid::{cancel_job_handler, job_handler, query_handler, register_handler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let repo_root = std::env::var("GITVEC_REPO_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."));
    let embedding_model = std::env::var("GITVEC_EMBEDDING_MODEL").unwrap_or_else(|_| "default".to_string());
    let bind_addr = std::env::var("GITVEC_APID_ADDR").unwrap_or_else(|_| "127.0.0.1:8099".to_string());

    let state = Arc::new(ApidState::open(repo_root, &embedding_model)?);

    let app = Router::new()
        .route("/register", post(register_handler))
        .route("/job/{id}", get(job_handler).delete(cancel_job_handler))
        .route("/query", post(query_handler))
        .with_state(state);

    tracing::info!("apid listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
