//! lumen-server: HTTP transport for the lumen occupancy pipeline

pub mod error;
pub mod http;
pub mod startup;
pub mod state;
pub mod stream;

pub use error::{ApiError, ApiResult};
pub use http::create_router;
pub use state::AppState;
