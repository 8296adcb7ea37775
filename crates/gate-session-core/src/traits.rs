//! Seams to the RPC layer and the errors that cross them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rpc::{GateReply, GateRequest};

/// Error reported by an RPC invoker.
///
/// Session proxies return these to their caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RpcError {
    #[error("rpc timeout: {method}")]
    Timeout { method: String },
    #[error("rpc transport error: {message}")]
    Transport { message: String },
    #[error("{message}")]
    Remote { message: String },
}

/// Session record error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("malformed session payload: {0}")]
    Format(String),
    #[error("failed to encode session: {0}")]
    Encode(String),
    #[error("session field {key}: expected {expected}, found {found}")]
    Type {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Callable endpoint of one gate node.
#[async_trait]
pub trait RpcInvoker: Send + Sync {
    /// Call and wait for the reply.
    async fn call(&self, request: GateRequest) -> Result<GateReply, RpcError>;

    /// Submit without waiting for a reply.
    ///
    /// Only a failure to dispatch is reported.
    async fn call_no_reply(&self, request: GateRequest) -> Result<(), RpcError>;
}

/// Maps a server id to its endpoint.
pub trait ServiceResolver: Send + Sync {
    /// Returns `None` if no live server has this id.
    fn server_by_id(&self, server_id: &str) -> Option<Arc<dyn RpcInvoker>>;
}
