//! Session proxy for client connections owned by a remote gate node.
//!
//! Provides:
//! - `SessionAgent` - Local stand-in for a remote client session
//! - Service registries (memory)

pub mod agent;
pub mod registry;

pub use agent::{GuestPredicate, LocalUserData, SessionAgent, SessionError};
#[cfg(feature = "memory")]
pub use registry::MemoryRegistry;
pub use gate_session_core::{
    GateArgs, GateMethod, GateReply, GateRequest, IdGenerator, RpcError, RpcInvoker,
    ServiceResolver, SessionState, Settings, StateError, TraceContext, UuidGenerator,
};
