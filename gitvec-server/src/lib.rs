//! Shared library code for the `matrixd` and `apid` binaries: axum
//! `State<Arc<...>>` app state, handlers, and the small adapters
//! (embedder, chunker, filter translation) each daemon needs.

pub mod app_state;
pub mod chunker;
pub mod embedder;
pub mod filter;
pub mod handlers;
