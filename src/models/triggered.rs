use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Job;

/// Schedule cursor of one job. Times are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct Triggered {
    pub id: u64,
    pub times: u64,
    pub prev_time: i64,
    pub next_time: i64,
}

impl Triggered {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Record a fire. The count only moves when a real timestamp is written,
    /// so suspending (0, 0) does not inflate it.
    pub fn record(&mut self, prev_time: i64, next_time: i64) {
        self.prev_time = prev_time;
        self.next_time = next_time;
        if prev_time != 0 || next_time != 0 {
            self.times += 1;
        }
    }

    /// The recorded next fire has passed unprocessed, the job is active with a
    /// non-zero threshold, and the overshoot is within that threshold.
    pub fn is_misfired(&self, job: &Job, now: i64) -> bool {
        if self.prev_time >= self.next_time || !job.is_active() || job.misfire_threshold == 0 {
            return false;
        }
        now > self.next_time && now - self.next_time <= job.misfire_threshold
    }
}
