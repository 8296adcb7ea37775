//! Calls a session proxy makes on its owning gate.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Settings, SessionState, TraceContext};

/// Remote method exposed by a gate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateMethod {
    Update,
    Bind,
    UnBind,
    Push,
    Set,
    Remove,
    Send,
    SendBatch,
    IsConnect,
    Close,
}

impl GateMethod {
    /// Method name as registered on the gate.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "Update",
            Self::Bind => "Bind",
            Self::UnBind => "UnBind",
            Self::Push => "Push",
            Self::Set => "Set",
            Self::Remove => "Remove",
            Self::Send => "Send",
            Self::SendBatch => "SendBatch",
            Self::IsConnect => "IsConnect",
            Self::Close => "Close",
        }
    }
}

impl fmt::Display for GateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method-specific arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateArgs {
    /// `Update`, `UnBind` and `Close`.
    Session { session_id: String },
    Bind { session_id: String, user_id: String },
    /// Full settings snapshot; the gate replaces its copy with it.
    Push { session_id: String, settings: Settings },
    Set { session_id: String, key: String, value: String },
    Remove { session_id: String, key: String },
    Send { session_id: String, topic: String, body: Bytes },
    SendBatch { session_ids: Vec<String>, topic: String, body: Bytes },
    IsConnect { session_id: String, user_id: String },
}

/// One call on a gate, tagged with the caller's trace context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRequest {
    pub method: GateMethod,
    pub trace: TraceContext,
    pub args: GateArgs,
}

impl GateRequest {
    #[must_use]
    pub const fn new(method: GateMethod, trace: TraceContext, args: GateArgs) -> Self {
        Self {
            method,
            trace,
            args,
        }
    }
}

/// What a gate answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GateReply {
    /// Nothing to report.
    Empty,
    /// Authoritative session record after the call.
    Session(SessionState),
    /// Number of sessions a batch send reached.
    Count(u64),
    /// Whether the asked-about user is connected.
    Connected(bool),
}

impl GateReply {
    /// Short variant name for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Session(_) => "session",
            Self::Count(_) => "count",
            Self::Connected(_) => "connected",
        }
    }
}
