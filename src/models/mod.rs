mod alarm;
mod job;
mod node;
mod trace;
mod triggered;
mod user;

pub use alarm::AlarmConfig;
pub use job::{
    Executor, ExecutorStatus, Job, JobStatus, Protocol, SelectStrategy, SubJobStrategy,
};
pub use node::Node;
pub use trace::{
    CleanScope, EXECUTE_STATUS_FAILED, EXECUTE_STATUS_SUCCEED, ScheduleType, Trace,
    TraceStatistic,
};
pub use triggered::Triggered;
pub use user::{DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_PASSWORD, User};
