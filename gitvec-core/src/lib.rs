//! Path-quantized vector store, temporal git index, and query pipeline
//! for local semantic code search. No network service, no container: a
//! repository's `.code-indexer/` directory is the entire runtime state.

pub mod cache;
pub mod config;
pub mod error;
pub mod gitbackend;
pub mod hashutil;
pub mod interop;
pub mod jobqueue;
pub mod materializer;
pub mod memory;
pub mod model;
pub mod projection;
pub mod quantizer;
pub mod query;
pub mod rebuild;
pub mod store;
pub mod temporal;

pub use error::{CoreError, CoreResult};
