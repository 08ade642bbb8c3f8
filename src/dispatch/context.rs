use std::sync::Mutex;

use crate::models::{Job, ScheduleType};
use crate::utils::time::now_secs;

/// Separator between detail lines in a stored trace.
pub const DETAIL_LINE_SEPARATOR: &str = "<line>";

const DETAIL_MAX_BYTES: usize = 100;
const DETAIL_ELLIPSIS: &str = " ... ...";

/// One run of a job, from firing to its trace.
pub struct ScheduleContext {
    pub job: Job,
    pub schedule_type: ScheduleType,
    /// Unix seconds
    pub start_time: i64,
    details: Mutex<Vec<String>>,
}

impl ScheduleContext {
    pub fn new(job: Job, schedule_type: ScheduleType) -> Self {
        Self::starting_at(job, schedule_type, now_secs())
    }

    pub fn starting_at(job: Job, schedule_type: ScheduleType, start_time: i64) -> Self {
        Self {
            job,
            schedule_type,
            start_time,
            details: Mutex::new(Vec::new()),
        }
    }

    /// Append a detail line. Shard calls append from concurrent tasks, so
    /// every append goes through the lock.
    pub fn detail(&self, message: impl Into<String>) {
        let line = truncate_detail(message.into());
        match self.details.lock() {
            Ok(mut details) => details.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }

    pub fn details(&self) -> Vec<String> {
        match self.details.lock() {
            Ok(details) => details.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn joined_details(&self) -> String {
        self.details().join(DETAIL_LINE_SEPARATOR)
    }
}

/// Cap a line at 100 bytes, cut on a char boundary, and mark the cut.
fn truncate_detail(mut line: String) -> String {
    if line.len() <= DETAIL_MAX_BYTES {
        return line;
    }
    let mut cut = DETAIL_MAX_BYTES;
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    line.truncate(cut);
    line.push_str(DETAIL_ELLIPSIS);
    line
}
