use crate::cluster::Replicator;
use crate::cluster::command::RaftCommand;
use crate::error::AppResult;
use crate::models::AlarmConfig;

/// The replicated alarm settings singleton.
#[derive(Clone)]
pub struct AlarmService {
    replicator: Replicator,
}

impl AlarmService {
    pub fn new(replicator: Replicator) -> Self {
        Self { replicator }
    }

    pub fn get(&self) -> AppResult<AlarmConfig> {
        self.replicator.store().alarm_config()
    }

    pub async fn update(&self, config: AlarmConfig) -> AppResult<AlarmConfig> {
        self.replicator.store().save_alarm_config(&config)?;
        tracing::info!(
            sys_alarm_email = %config.sys_alarm_email,
            webhook_override = !config.webhook_url.is_empty(),
            "alarm config updated"
        );
        self.replicator
            .submit(RaftCommand::SaveAlarmConfig(config.clone()))
            .await?;
        Ok(config)
    }
}
