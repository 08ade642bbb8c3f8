use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Cluster-wide alarm settings, stored as a singleton.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct AlarmConfig {
    /// System health alarms are raised only when this is set
    pub sys_alarm_email: String,
    /// Overrides the configured alert webhook when non-empty
    pub webhook_url: String,
}

impl AlarmConfig {
    pub fn system_alarms_enabled(&self) -> bool {
        !self.sys_alarm_email.is_empty()
    }
}
