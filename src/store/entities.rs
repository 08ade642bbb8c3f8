//! Typed access to the entity buckets.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{AlarmConfig, Job, Node, Triggered, User};
use crate::store::{Bucket, KvStore, WriteOp, decode, encode, u64_key};

const ALARM_CONFIG_KEY: u64 = 1;

const META_SNAPSHOT_VERSION: &[u8] = b"snapshot_version";
const META_FIRST_START: &[u8] = b"first_start";
const META_LAST_TCP_PORT: &[u8] = b"last_tcp_port";
const META_LAST_NODE_NAME: &[u8] = b"last_node_name";

/// Every replicated entity, as carried by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicatedState {
    pub jobs: Vec<Job>,
    pub triggered: Vec<Triggered>,
    pub nodes: Vec<Node>,
    pub users: Vec<User>,
    pub alarm_config: AlarmConfig,
}

#[derive(Clone)]
pub struct EntityStore {
    kv: Arc<dyn KvStore>,
}

impl EntityStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    fn get_as<T: DeserializeOwned>(&self, bucket: Bucket, key: &[u8]) -> AppResult<Option<T>> {
        self.kv
            .get(bucket, key)?
            .map(|bytes| decode(bucket.name(), &bytes))
            .transpose()
    }

    /// Undecodable entries are logged and skipped so one bad record does not
    /// hide the rest of the bucket.
    fn list_as<T: DeserializeOwned>(&self, bucket: Bucket) -> AppResult<Vec<T>> {
        Ok(self
            .kv
            .scan(bucket)?
            .into_iter()
            .filter_map(|(_, bytes)| match decode(bucket.name(), &bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!(bucket = bucket.name(), error = %e, "skipping unreadable entry");
                    None
                }
            })
            .collect())
    }

    fn put_op<T: Serialize>(bucket: Bucket, key: &[u8], value: &T) -> AppResult<WriteOp> {
        Ok(WriteOp::put(bucket, key, encode(bucket.name(), value)?))
    }

    // ---------------------------------------------------------------- jobs

    pub fn list_jobs(&self) -> AppResult<Vec<Job>> {
        self.list_as(Bucket::Job)
    }

    pub fn find_job(&self, id: u64) -> AppResult<Option<Job>> {
        self.get_as(Bucket::Job, &u64_key(id))
    }

    pub fn get_job(&self, id: u64) -> AppResult<Job> {
        self.find_job(id)?
            .ok_or_else(|| AppError::not_found("job", "id", id))
    }

    /// Store a job together with an empty schedule cursor.
    pub fn cascade_insert_job(&self, job: &Job) -> AppResult<()> {
        self.kv.transaction(vec![
            Self::put_op(Bucket::Job, &u64_key(job.id), job)?,
            Self::put_op(Bucket::Triggered, &u64_key(job.id), &Triggered::new(job.id))?,
        ])
    }

    pub fn update_job(&self, job: &Job) -> AppResult<()> {
        self.kv.transaction(vec![Self::put_op(Bucket::Job, &u64_key(job.id), job)?])
    }

    /// Remove a job and its schedule cursor.
    pub fn cascade_delete_job(&self, id: u64) -> AppResult<()> {
        self.kv.transaction(vec![
            WriteOp::delete(Bucket::Job, u64_key(id).to_vec()),
            WriteOp::delete(Bucket::Triggered, u64_key(id).to_vec()),
        ])
    }

    pub fn job_count(&self) -> AppResult<usize> {
        Ok(self.kv.scan(Bucket::Job)?.len())
    }

    // ----------------------------------------------------------- triggered

    pub fn find_triggered(&self, id: u64) -> AppResult<Option<Triggered>> {
        self.get_as(Bucket::Triggered, &u64_key(id))
    }

    pub fn get_triggered(&self, id: u64) -> AppResult<Triggered> {
        self.find_triggered(id)?
            .ok_or_else(|| AppError::not_found("triggered", "id", id))
    }

    pub fn save_triggered(&self, triggered: &Triggered) -> AppResult<()> {
        self.kv.transaction(vec![Self::put_op(
            Bucket::Triggered,
            &u64_key(triggered.id),
            triggered,
        )?])
    }

    pub fn list_triggered(&self) -> AppResult<Vec<Triggered>> {
        self.list_as(Bucket::Triggered)
    }

    pub fn total_fire_times(&self) -> AppResult<u64> {
        Ok(self.list_triggered()?.iter().map(|t| t.times).sum())
    }

    /// Cursors whose recorded fire was missed and may still be compensated.
    pub fn select_misfires(&self, now: i64) -> AppResult<Vec<Triggered>> {
        let mut misfires = Vec::new();
        for triggered in self.list_triggered()? {
            if triggered.prev_time >= triggered.next_time {
                continue;
            }
            let Some(job) = self.find_job(triggered.id)? else {
                continue;
            };
            if triggered.is_misfired(&job, now) {
                misfires.push(triggered);
            }
        }
        Ok(misfires)
    }

    // --------------------------------------------------------------- nodes

    pub fn find_node(&self, name: &str) -> AppResult<Option<Node>> {
        self.get_as(Bucket::Node, name.as_bytes())
    }

    pub fn node_by_tcp_addr(&self, tcp_addr: &str) -> AppResult<Option<Node>> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .find(|n| n.tcp_addr == tcp_addr))
    }

    pub fn list_nodes(&self) -> AppResult<Vec<Node>> {
        self.list_as(Bucket::Node)
    }

    /// Register a node, assigning the next machine number (the first is 1).
    pub fn insert_node(&self, node: &Node) -> AppResult<Node> {
        let next = self
            .list_nodes()?
            .iter()
            .map(|n| n.machine_num)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| AppError::cluster("machine numbers exhausted"))?;
        let node = Node {
            machine_num: next,
            ..node.clone()
        };
        self.save_node(&node)?;
        Ok(node)
    }

    pub fn save_node(&self, node: &Node) -> AppResult<()> {
        self.kv.transaction(vec![Self::put_op(
            Bucket::Node,
            node.name.as_bytes(),
            node,
        )?])
    }

    // --------------------------------------------------------------- users

    pub fn list_users(&self) -> AppResult<Vec<User>> {
        self.list_as(Bucket::User)
    }

    pub fn find_user(&self, id: u64) -> AppResult<Option<User>> {
        self.get_as(Bucket::User, &u64_key(id))
    }

    pub fn user_by_name(&self, name: &str) -> AppResult<Option<User>> {
        Ok(self.list_users()?.into_iter().find(|u| u.name == name))
    }

    pub fn save_user(&self, user: &User) -> AppResult<()> {
        self.kv
            .transaction(vec![Self::put_op(Bucket::User, &u64_key(user.id), user)?])
    }

    pub fn delete_user(&self, id: u64) -> AppResult<()> {
        self.kv.delete(Bucket::User, &u64_key(id))
    }

    /// Seed the console account on an empty user bucket.
    pub fn create_default_user_if_absent(&self, user: &User) -> AppResult<bool> {
        if !self.kv.scan(Bucket::User)?.is_empty() {
            return Ok(false);
        }
        self.save_user(user)?;
        tracing::info!(user = %user.name, "default user created");
        Ok(true)
    }

    // --------------------------------------------------------------- alarm

    pub fn alarm_config(&self) -> AppResult<AlarmConfig> {
        Ok(self
            .get_as(Bucket::AlarmConfig, &u64_key(ALARM_CONFIG_KEY))?
            .unwrap_or_default())
    }

    pub fn save_alarm_config(&self, config: &AlarmConfig) -> AppResult<()> {
        self.kv.transaction(vec![Self::put_op(
            Bucket::AlarmConfig,
            &u64_key(ALARM_CONFIG_KEY),
            config,
        )?])
    }

    pub fn init_alarm_config(&self) -> AppResult<()> {
        if self
            .kv
            .get(Bucket::AlarmConfig, &u64_key(ALARM_CONFIG_KEY))?
            .is_none()
        {
            self.save_alarm_config(&AlarmConfig::default())?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------- meta

    pub fn snapshot_version(&self) -> AppResult<i64> {
        Ok(self
            .get_as(Bucket::Meta, META_SNAPSHOT_VERSION)?
            .unwrap_or(0))
    }

    pub fn set_snapshot_version(&self, version: i64) -> AppResult<()> {
        self.put_meta(META_SNAPSHOT_VERSION, &version)
    }

    /// True until the first-start marker has been negated.
    pub fn is_first_start(&self) -> AppResult<bool> {
        Ok(self.get_as(Bucket::Meta, META_FIRST_START)?.unwrap_or(true))
    }

    pub fn negate_first_start(&self) -> AppResult<()> {
        self.put_meta(META_FIRST_START, &false)
    }

    pub fn last_tcp_port(&self) -> AppResult<Option<u16>> {
        self.get_as(Bucket::Meta, META_LAST_TCP_PORT)
    }

    pub fn set_last_tcp_port(&self, port: u16) -> AppResult<()> {
        self.put_meta(META_LAST_TCP_PORT, &port)
    }

    pub fn last_node_name(&self) -> AppResult<Option<String>> {
        self.get_as(Bucket::Meta, META_LAST_NODE_NAME)
    }

    pub fn set_last_node_name(&self, name: &str) -> AppResult<()> {
        self.put_meta(META_LAST_NODE_NAME, &name.to_string())
    }

    fn put_meta<T: Serialize>(&self, key: &[u8], value: &T) -> AppResult<()> {
        self.kv
            .transaction(vec![Self::put_op(Bucket::Meta, key, value)?])
    }

    // ----------------------------------------------------------- snapshots

    pub fn export_replicated(&self) -> AppResult<ReplicatedState> {
        Ok(ReplicatedState {
            jobs: self.list_jobs()?,
            triggered: self.list_triggered()?,
            nodes: self.list_nodes()?,
            users: self.list_users()?,
            alarm_config: self.alarm_config()?,
        })
    }

    /// Replace every replicated bucket with `state` in one transaction.
    /// Meta and consensus buckets are left alone.
    pub fn replace_replicated(&self, state: &ReplicatedState) -> AppResult<()> {
        let mut ops: Vec<WriteOp> = Bucket::REPLICATED
            .iter()
            .map(|bucket| WriteOp::Reset { bucket: *bucket })
            .collect();
        for job in &state.jobs {
            ops.push(Self::put_op(Bucket::Job, &u64_key(job.id), job)?);
        }
        for triggered in &state.triggered {
            ops.push(Self::put_op(
                Bucket::Triggered,
                &u64_key(triggered.id),
                triggered,
            )?);
        }
        for node in &state.nodes {
            ops.push(Self::put_op(Bucket::Node, node.name.as_bytes(), node)?);
        }
        for user in &state.users {
            ops.push(Self::put_op(Bucket::User, &u64_key(user.id), user)?);
        }
        ops.push(Self::put_op(
            Bucket::AlarmConfig,
            &u64_key(ALARM_CONFIG_KEY),
            &state.alarm_config,
        )?);
        self.kv.transaction(ops)
    }

    pub fn reset_replicated(&self) -> AppResult<()> {
        self.kv.reset(&Bucket::REPLICATED)
    }
}
