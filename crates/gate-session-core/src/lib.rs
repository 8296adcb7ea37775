//! Core types for gate session proxies.
//!
//! This crate provides the pieces a proxy is built from:
//! - `SessionState` - The serializable session record
//! - `TraceContext` / `IdGenerator` - Trace and span identifiers
//! - `GateRequest` / `GateReply` - Typed calls on the owning gate
//! - `ServiceResolver` / `RpcInvoker` - The injected RPC capability

pub mod rpc;
pub mod state;
pub mod trace;
pub mod traits;

pub use rpc::{GateArgs, GateMethod, GateReply, GateRequest};
pub use state::{SessionState, Settings};
pub use trace::{IdGenerator, TraceContext, UuidGenerator};
pub use traits::{RpcError, RpcInvoker, ServiceResolver, StateError};
