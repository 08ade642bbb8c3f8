//! Data Transfer Objects for API requests and responses.
//!
//! DTOs are organized by domain:
//! - `job` - Job and cron request/response DTOs
//! - `user` - User-related request/response DTOs
//! - `trace` - Execution history filters
//! - `health` - Health check responses
//! - `error` - Common error response DTOs
//! - `pagination` - Paged response wrapper

mod error;
mod health;
mod job;
mod pagination;
mod trace;
mod user;

pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use job::{CronQuery, CronValidation, JobRequest, JobStatusRequest, JobView};
pub use pagination::{PagedResponse, PaginationMeta};
pub use trace::{CleanResponse, TraceFilter};
pub use user::{CreateUserRequest, LoginRequest, UpdateUserRequest, UserResponse};
