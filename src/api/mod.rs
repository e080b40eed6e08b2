//! HTTP surface for the sync pipeline.
//!
//! `sync_api_router()` returns a composable `Router`; `start_api_server()`
//! binds it and runs it in the background.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::sync_api_router;
pub use server::{start_api_server, ApiServerInfo, SyncApiServer};
pub use types::ApiContext;
