//! HTTP request handlers for API endpoints.
//!
//! This module contains all request handlers organized by resource type.

pub mod alarm;
pub mod cluster;
pub mod cron;
pub mod health;
pub mod jobs;
pub mod raft;
pub mod runtime;
pub mod traces;
pub mod users;
