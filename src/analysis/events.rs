//! Wire messages of an analysis session
//!
//! Outbound events and inbound control messages are JSON objects tagged by a
//! `type` field, one per line on the transport.

use serde::{Deserialize, Serialize};

use crate::types::{BranchRecord, RepoInfo};

/// Outbound session event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Repository metadata, sent first
    RepoInfo { data: RepoInfo },
    /// Free-form status line
    Status { message: String },
    /// About to classify `branch`
    Progress {
        current: usize,
        total: usize,
        #[serde(rename = "branchName")]
        branch: String,
    },
    /// Session is paused; repeated on every heartbeat
    Paused { current: usize, total: usize },
    /// One classified branch
    Branch { data: BranchRecord },
    /// Every branch was reported
    Complete { total: usize },
    Error { message: String },
}

impl Event {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize as one JSON line
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Control message from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Pause,
    Resume,
}

/// Anything received on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Control(ControlMessage),
    /// Input that is not a known control message; ends the session
    Malformed(String),
}

impl Inbound {
    pub fn from_json(line: &str) -> Self {
        match serde_json::from_str::<ControlMessage>(line.trim()) {
            Ok(msg) => Self::Control(msg),
            Err(e) => Self::Malformed(format!("{}: {}", e, line.trim())),
        }
    }
}

impl From<ControlMessage> for Inbound {
    fn from(msg: ControlMessage) -> Self {
        Self::Control(msg)
    }
}
