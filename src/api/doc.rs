use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::utils::sign::{SIGN_HEADER, TIMESTAMP_HEADER};

pub const JOB_TAG: &str = "Jobs";
pub const CRON_TAG: &str = "Cron";
pub const TRACE_TAG: &str = "Traces";
pub const USER_TAG: &str = "Users";
pub const ALARM_TAG: &str = "Alarm";
pub const RUNTIME_TAG: &str = "Runtime";
pub const CLUSTER_TAG: &str = "Cluster";
pub const HEALTH_TAG: &str = "Health";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "cronhive",
        description = "Distributed cron scheduler firing HTTP callbacks",
    ),
    modifiers(&SecurityAddon),
    components(
        schemas(
            crate::api::dto::ErrorResponse,
            crate::models::Job,
            crate::models::Trace,
        )
    ),
    tags(
        (name = JOB_TAG, description = "Job scheduling endpoints"),
        (name = CRON_TAG, description = "Cron expression helpers"),
        (name = TRACE_TAG, description = "Execution history endpoints"),
        (name = USER_TAG, description = "Console account endpoints"),
        (name = ALARM_TAG, description = "Alarm configuration endpoints"),
        (name = RUNTIME_TAG, description = "Runtime overview endpoints"),
        (name = CLUSTER_TAG, description = "Cluster membership endpoints"),
        (name = HEALTH_TAG, description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "timestamp",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    TIMESTAMP_HEADER,
                    "Unix seconds when the request was signed",
                ))),
            );
            components.add_security_scheme(
                "signature",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    SIGN_HEADER,
                    "Hex HMAC-SHA256 of path, query and timestamp",
                ))),
            );
        }
    }
}
