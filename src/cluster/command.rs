//! The replicated command set and its wire envelope.
//!
//! Every log entry carries a [`CommandEnvelope`]: a one-byte command code and
//! the bincode body of that command. Keeping the code outside the body lets a
//! node skip commands it does not know instead of failing the whole log.

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{AlarmConfig, Job, Node, Triggered, User};
use crate::store::{decode, encode};

pub const CODE_INSERT_JOB: u8 = 10;
pub const CODE_UPDATE_JOB: u8 = 11;
pub const CODE_DELETE_JOB: u8 = 12;
pub const CODE_SAVE_TRIGGERED: u8 = 21;
pub const CODE_SAVE_NODE: u8 = 31;
pub const CODE_SAVE_USER: u8 = 41;
pub const CODE_DELETE_USER: u8 = 42;
pub const CODE_SAVE_ALARM_CONFIG: u8 = 51;
pub const CODE_NEGATE_FIRST_START: u8 = 61;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaftCommand {
    InsertJob(Job),
    UpdateJob(Job),
    DeleteJob(u64),
    SaveTriggered(Triggered),
    SaveNode(Node),
    SaveUser(User),
    DeleteUser(u64),
    SaveAlarmConfig(AlarmConfig),
    NegateFirstStart,
}

impl RaftCommand {
    pub fn code(&self) -> u8 {
        match self {
            RaftCommand::InsertJob(_) => CODE_INSERT_JOB,
            RaftCommand::UpdateJob(_) => CODE_UPDATE_JOB,
            RaftCommand::DeleteJob(_) => CODE_DELETE_JOB,
            RaftCommand::SaveTriggered(_) => CODE_SAVE_TRIGGERED,
            RaftCommand::SaveNode(_) => CODE_SAVE_NODE,
            RaftCommand::SaveUser(_) => CODE_SAVE_USER,
            RaftCommand::DeleteUser(_) => CODE_DELETE_USER,
            RaftCommand::SaveAlarmConfig(_) => CODE_SAVE_ALARM_CONFIG,
            RaftCommand::NegateFirstStart => CODE_NEGATE_FIRST_START,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RaftCommand::InsertJob(_) => "insert_job",
            RaftCommand::UpdateJob(_) => "update_job",
            RaftCommand::DeleteJob(_) => "delete_job",
            RaftCommand::SaveTriggered(_) => "save_triggered",
            RaftCommand::SaveNode(_) => "save_node",
            RaftCommand::SaveUser(_) => "save_user",
            RaftCommand::DeleteUser(_) => "delete_user",
            RaftCommand::SaveAlarmConfig(_) => "save_alarm_config",
            RaftCommand::NegateFirstStart => "negate_first_start",
        }
    }

    pub fn to_envelope(&self) -> AppResult<CommandEnvelope> {
        let body = match self {
            RaftCommand::InsertJob(job) | RaftCommand::UpdateJob(job) => encode("job", job)?,
            RaftCommand::DeleteJob(id) | RaftCommand::DeleteUser(id) => encode("entity id", id)?,
            RaftCommand::SaveTriggered(triggered) => encode("triggered", triggered)?,
            RaftCommand::SaveNode(node) => encode("node", node)?,
            RaftCommand::SaveUser(user) => encode("user", user)?,
            RaftCommand::SaveAlarmConfig(config) => encode("alarm config", config)?,
            RaftCommand::NegateFirstStart => Vec::new(),
        };
        Ok(CommandEnvelope {
            code: self.code(),
            body,
        })
    }
}

/// Log entry payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub code: u8,
    pub body: Vec<u8>,
}

impl CommandEnvelope {
    /// `Ok(None)` for a code this build does not know.
    pub fn decode(&self) -> AppResult<Option<RaftCommand>> {
        let command = match self.code {
            CODE_INSERT_JOB => RaftCommand::InsertJob(decode("job", &self.body)?),
            CODE_UPDATE_JOB => RaftCommand::UpdateJob(decode("job", &self.body)?),
            CODE_DELETE_JOB => RaftCommand::DeleteJob(decode("entity id", &self.body)?),
            CODE_SAVE_TRIGGERED => RaftCommand::SaveTriggered(decode("triggered", &self.body)?),
            CODE_SAVE_NODE => RaftCommand::SaveNode(decode("node", &self.body)?),
            CODE_SAVE_USER => RaftCommand::SaveUser(decode("user", &self.body)?),
            CODE_DELETE_USER => RaftCommand::DeleteUser(decode("entity id", &self.body)?),
            CODE_SAVE_ALARM_CONFIG => {
                RaftCommand::SaveAlarmConfig(decode("alarm config", &self.body)?)
            }
            CODE_NEGATE_FIRST_START => RaftCommand::NegateFirstStart,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

impl std::fmt::Display for CommandEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command(code={}, {} bytes)", self.code, self.body.len())
    }
}

/// Result of applying one entry on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub applied: bool,
}
