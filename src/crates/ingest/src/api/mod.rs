//! HTTP submission API
//!
//! REST surface for enqueueing URLs and polling task status.

pub mod error;
pub mod models;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
