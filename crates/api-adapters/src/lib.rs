//! # api-adapters
//!
//! JSON HTTP surface over the learnhub services.
//!
//! The axum implementation lives behind the `web-axum` feature. Handlers
//! stay thin: extract the request facts, call one service, map the result.

#[cfg(feature = "web-axum")]
mod cookies;
#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
mod handlers;
#[cfg(feature = "web-axum")]
mod router;
#[cfg(feature = "web-axum")]
pub mod state;

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use extract::Viewer;
#[cfg(feature = "web-axum")]
pub use router::{build_router, serve};
#[cfg(feature = "web-axum")]
pub use state::AppState;
