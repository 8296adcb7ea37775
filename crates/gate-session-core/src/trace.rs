//! Distributed-tracing context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trace and span identifiers carried by every call to the owning gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    #[must_use]
    pub const fn new(trace_id: String, span_id: String) -> Self {
        Self { trace_id, span_id }
    }

    /// Start a new trace with a fresh root span.
    #[must_use]
    pub fn generate(ids: &dyn IdGenerator) -> Self {
        Self::new(ids.generate(), ids.generate())
    }

    /// Same trace, new span.
    #[must_use]
    pub fn fork(&self, ids: &dyn IdGenerator) -> Self {
        Self::new(self.trace_id.clone(), ids.generate())
    }
}

/// Source of globally unique trace and span identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs in simple (hex) form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
