//! Middleware components for request processing.
//!
//! Request ID tracking and logging wrap every route; signature verification
//! guards `/api` and `/cluster`; the leader guard keeps writes off followers.

mod error_handler;
mod leader_guard;
mod logging;
mod request_id;
mod signature;

pub use error_handler::{error_to_response_with_request_id, error_to_status_code};
pub use leader_guard::leader_guard_middleware;
pub use logging::logging_middleware;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use signature::{MAX_SIGNATURE_AGE_SECS, SignSecret, signature_middleware};
