//! Local proxy for a client session owned by a remote gate.
//!
//! Reads are answered from the last-known record. Local mutators
//! (`set_ip`, `set_local_kv`, ...) change only that record and never reach
//! the gate. Remote-synced calls (`update`, `bind`, `push`, ...) go to the
//! owning gate and, when it answers with a session record, replace the local
//! one wholesale. Between syncs the local record is advisory; right after a
//! sync it is what the gate holds.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use bytes::Bytes;
use gate_session_core::{
    GateArgs, GateMethod, GateReply, GateRequest, IdGenerator, RpcError, RpcInvoker,
    ServiceResolver, SessionState, Settings, StateError, TraceContext, UuidGenerator,
};
use parking_lot::RwLock;
use serde_json::Value;

/// Session proxy error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Gate capability not configured")]
    NotInitialized,
    #[error("Service not found id({server_id})")]
    ServiceNotFound { server_id: String },
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Remote call failed: {0}")]
    Remote(#[from] RpcError),
    #[error("Unexpected {reply} reply to {method}")]
    UnexpectedReply {
        method: GateMethod,
        reply: &'static str,
    },
}

/// Opaque per-process data attached to a session.
pub type LocalUserData = Arc<dyn Any + Send + Sync>;

/// Custom rule deciding whether a session counts as a guest.
pub type GuestPredicate = Arc<dyn Fn(&SessionAgent) -> bool + Send + Sync>;

/// Resolved target of one remote call.
struct Route {
    endpoint: Arc<dyn RpcInvoker>,
    server_id: String,
    session_id: String,
    trace: TraceContext,
}

impl Route {
    fn request(
        self,
        method: GateMethod,
        args: impl FnOnce(String) -> GateArgs,
    ) -> (Arc<dyn RpcInvoker>, String, GateRequest) {
        tracing::debug!(
            method = %method,
            server_id = %self.server_id,
            session_id = %self.session_id,
            trace_id = %self.trace.trace_id,
            "Calling owning gate"
        );
        let request = GateRequest::new(method, self.trace, args(self.session_id));
        (self.endpoint, self.server_id, request)
    }

    async fn call(
        self,
        method: GateMethod,
        args: impl FnOnce(String) -> GateArgs,
    ) -> Result<GateReply, SessionError> {
        let (endpoint, server_id, request) = self.request(method, args);
        endpoint.call(request).await.map_err(|e| {
            tracing::debug!("{method} on {server_id} failed: {e}");
            SessionError::Remote(e)
        })
    }

    async fn call_no_reply(
        self,
        method: GateMethod,
        args: impl FnOnce(String) -> GateArgs,
    ) -> Result<(), SessionError> {
        let (endpoint, server_id, request) = self.request(method, args);
        endpoint.call_no_reply(request).await.map_err(|e| {
            tracing::debug!("Dispatching {method} to {server_id} failed: {e}");
            SessionError::Remote(e)
        })
    }
}

/// Local stand-in for a client session whose connection lives on a gate.
///
/// All fields of the record sit behind one reader/writer lock, so readers
/// never see a half-applied reply. The lock is never held across a remote
/// call. Clones fork a new span and get their own lock.
pub struct SessionAgent {
    state: RwLock<SessionState>,
    resolver: Option<Arc<dyn ServiceResolver>>,
    ids: Arc<dyn IdGenerator>,
    user_data: RwLock<Option<LocalUserData>>,
    judge_guest: RwLock<Option<GuestPredicate>>,
}

impl SessionAgent {
    /// Wrap a record. Remote-synced calls fail until a resolver is set.
    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self {
            state: RwLock::new(state),
            resolver: None,
            ids: Arc::new(UuidGenerator),
            user_data: RwLock::new(None),
            judge_guest: RwLock::new(None),
        }
    }

    /// Build from a binary session payload.
    ///
    /// # Errors
    /// Returns error if the payload is malformed.
    pub fn decode(data: &[u8]) -> Result<Self, SessionError> {
        Ok(Self::new(SessionState::decode(data)?))
    }

    /// Build from a loosely-typed map.
    ///
    /// # Errors
    /// Returns error if a recognized key holds the wrong type.
    pub fn from_loose_map(map: &HashMap<String, Value>) -> Result<Self, SessionError> {
        Ok(Self::new(SessionState::from_loose_map(map)?))
    }

    /// Route remote-synced calls through this resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ServiceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use this generator for trace and span ids.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn ip(&self) -> String {
        self.state.read().ip.clone()
    }

    #[must_use]
    pub fn network(&self) -> String {
        self.state.read().network.clone()
    }

    #[must_use]
    pub fn topic(&self) -> String {
        self.state.read().topic.clone()
    }

    #[must_use]
    pub fn user_id(&self) -> String {
        self.state.read().user_id.clone()
    }

    /// Numeric user id, if the bound id is one.
    #[must_use]
    pub fn user_id_i64(&self) -> Option<i64> {
        self.state.read().user_id.parse().ok()
    }

    #[must_use]
    pub fn session_id(&self) -> String {
        self.state.read().session_id.clone()
    }

    #[must_use]
    pub fn server_id(&self) -> String {
        self.state.read().server_id.clone()
    }

    #[must_use]
    pub fn trace_id(&self) -> String {
        self.state.read().trace_id.clone()
    }

    #[must_use]
    pub fn span_id(&self) -> String {
        self.state.read().span_id.clone()
    }

    /// Trace context sent with every remote call.
    #[must_use]
    pub fn trace(&self) -> TraceContext {
        self.state.read().trace()
    }

    /// Copy of the settings map.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.state.read().settings.clone()
    }

    /// Setting for `key`, or an empty string.
    #[must_use]
    pub fn get(&self, key: &str) -> String {
        self.state
            .read()
            .settings
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Consistent snapshot of the whole record.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn local_user_data(&self) -> Option<LocalUserData> {
        self.user_data.read().clone()
    }

    /// Local user data, if it is a `T`.
    #[must_use]
    pub fn local_user_data_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.local_user_data()?.downcast::<T>().ok()
    }

    pub fn set_ip(&self, ip: impl Into<String>) {
        self.state.write().ip = ip.into();
    }

    pub fn set_network(&self, network: impl Into<String>) {
        self.state.write().network = network.into();
    }

    pub fn set_topic(&self, topic: impl Into<String>) {
        self.state.write().topic = topic.into();
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.state.write().user_id = user_id.into();
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.state.write().session_id = session_id.into();
    }

    pub fn set_server_id(&self, server_id: impl Into<String>) {
        self.state.write().server_id = server_id.into();
    }

    pub fn set_settings(&self, settings: Settings) {
        self.state.write().settings = settings;
    }

    /// Set a setting locally. The gate is not told.
    pub fn set_local_kv(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state
            .write()
            .settings
            .insert(key.into(), value.into());
    }

    /// Remove a setting locally. The gate is not told.
    pub fn remove_local_kv(&self, key: &str) {
        self.state.write().settings.remove(key);
    }

    pub fn set_local_user_data(&self, data: LocalUserData) {
        *self.user_data.write() = Some(data);
    }

    /// Encode the record.
    ///
    /// # Errors
    /// Returns error if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, SessionError> {
        Ok(self.state.read().encode()?)
    }

    /// Replace the whole record from a binary payload.
    ///
    /// # Errors
    /// Returns error if the payload is malformed; the record is left as is.
    pub fn restore(&self, data: &[u8]) -> Result<(), SessionError> {
        let state = SessionState::decode(data)?;
        *self.state.write() = state;
        Ok(())
    }

    /// Start a new trace in place.
    pub fn create_trace(&self) {
        let trace = TraceContext::generate(self.ids.as_ref());
        let mut state = self.state.write();
        state.trace_id = trace.trace_id;
        state.span_id = trace.span_id;
    }

    /// Fork a span handle; same as `clone`.
    #[must_use]
    pub fn extract_span(&self) -> Self {
        self.clone()
    }

    /// Whether no user is bound, or what the registered predicate says.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        let judge = self.judge_guest.read().clone();
        judge.map_or_else(|| self.state.read().user_id.is_empty(), |judge| judge(self))
    }

    /// Replace the default guest rule (`user_id` is empty).
    pub fn set_guest_predicate(&self, judge: impl Fn(&Self) -> bool + Send + Sync + 'static) {
        *self.judge_guest.write() = Some(Arc::new(judge));
    }

    /// Re-read the session from the gate.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn update(&self) -> Result<(), SessionError> {
        self.sync(GateMethod::Update, |session_id| GateArgs::Session { session_id })
            .await
    }

    /// Bind the session to a user.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn bind(&self, user_id: &str) -> Result<(), SessionError> {
        self.sync(GateMethod::Bind, |session_id| GateArgs::Bind {
            session_id,
            user_id: user_id.to_owned(),
        })
        .await
    }

    /// Drop the user binding.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn unbind(&self) -> Result<(), SessionError> {
        self.sync(GateMethod::UnBind, |session_id| GateArgs::Session { session_id })
            .await
    }

    /// Send a snapshot of the local settings to the gate.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn push(&self) -> Result<(), SessionError> {
        self.sync(GateMethod::Push, |session_id| GateArgs::Push {
            session_id,
            settings: self.settings(),
        })
        .await
    }

    /// Set a setting on the gate.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.sync(GateMethod::Set, |session_id| GateArgs::Set {
            session_id,
            key: key.to_owned(),
            value: value.to_owned(),
        })
        .await
    }

    /// Set a setting locally, then push all settings.
    ///
    /// The local write and the push snapshot are not atomic; a concurrent
    /// local write may land in between.
    ///
    /// # Errors
    /// Returns error if no capability is configured (nothing is written),
    /// or if the push fails (the local write stays).
    pub async fn set_push(&self, key: &str, value: &str) -> Result<(), SessionError> {
        if self.resolver.is_none() {
            return Err(SessionError::NotInitialized);
        }
        self.set_local_kv(key, value);
        self.push().await
    }

    /// Replace the gate's settings with `settings`.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn set_batch(&self, settings: &Settings) -> Result<(), SessionError> {
        self.sync(GateMethod::Push, |session_id| GateArgs::Push {
            session_id,
            settings: settings.clone(),
        })
        .await
    }

    /// Remove a setting on the gate.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.sync(GateMethod::Remove, |session_id| GateArgs::Remove {
            session_id,
            key: key.to_owned(),
        })
        .await
    }

    /// Deliver a message to this client and wait for the gate to accept it.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn send(&self, topic: &str, body: Bytes) -> Result<(), SessionError> {
        self.route()?
            .call(GateMethod::Send, |session_id| GateArgs::Send {
                session_id,
                topic: topic.to_owned(),
                body,
            })
            .await
            .map(drop)
    }

    /// Deliver a message to several sessions on the same gate.
    ///
    /// Returns how many sessions the gate reached.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached, rejects the call, or
    /// answers with something other than a count.
    pub async fn send_batch(
        &self,
        session_ids: &[String],
        topic: &str,
        body: Bytes,
    ) -> Result<u64, SessionError> {
        let reply = self
            .route()?
            .call(GateMethod::SendBatch, |_| GateArgs::SendBatch {
                session_ids: session_ids.to_vec(),
                topic: topic.to_owned(),
                body,
            })
            .await?;

        match reply {
            GateReply::Count(count) => Ok(count),
            other => Err(SessionError::UnexpectedReply {
                method: GateMethod::SendBatch,
                reply: other.kind(),
            }),
        }
    }

    /// Ask the gate whether `user_id` has a live connection.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached, rejects the call, or
    /// answers with something other than a boolean.
    pub async fn is_connected(&self, user_id: &str) -> Result<bool, SessionError> {
        let reply = self
            .route()?
            .call(GateMethod::IsConnect, |session_id| GateArgs::IsConnect {
                session_id,
                user_id: user_id.to_owned(),
            })
            .await?;

        match reply {
            GateReply::Connected(connected) => Ok(connected),
            other => Err(SessionError::UnexpectedReply {
                method: GateMethod::IsConnect,
                reply: other.kind(),
            }),
        }
    }

    /// Deliver a message without waiting for the gate.
    ///
    /// # Errors
    /// Returns error only if the call could not be dispatched.
    pub async fn send_no_reply(&self, topic: &str, body: Bytes) -> Result<(), SessionError> {
        self.route()?
            .call_no_reply(GateMethod::Send, |session_id| GateArgs::Send {
                session_id,
                topic: topic.to_owned(),
                body,
            })
            .await
    }

    /// Ask the gate to close the client connection.
    ///
    /// # Errors
    /// Returns error if the gate cannot be reached or rejects the call.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.route()?
            .call(GateMethod::Close, |session_id| GateArgs::Session { session_id })
            .await
            .map(drop)
    }

    fn route(&self) -> Result<Route, SessionError> {
        let Some(resolver) = self.resolver.as_ref() else {
            tracing::warn!("Session has no gate capability configured");
            return Err(SessionError::NotInitialized);
        };

        let (server_id, session_id, trace) = {
            let state = self.state.read();
            (state.server_id.clone(), state.session_id.clone(), state.trace())
        };

        let Some(endpoint) = resolver.server_by_id(&server_id) else {
            tracing::warn!("Service not found id({server_id}) for session {session_id}");
            return Err(SessionError::ServiceNotFound { server_id });
        };

        Ok(Route {
            endpoint,
            server_id,
            session_id,
            trace,
        })
    }

    async fn sync(
        &self,
        method: GateMethod,
        args: impl FnOnce(String) -> GateArgs,
    ) -> Result<(), SessionError> {
        let reply = self.route()?.call(method, args).await?;

        match reply {
            GateReply::Session(record) => {
                tracing::trace!("Adopting {method} reply for session {}", record.session_id);
                self.state.write().adopt(record);
                Ok(())
            }
            GateReply::Empty => Ok(()),
            other => Err(SessionError::UnexpectedReply {
                method,
                reply: other.kind(),
            }),
        }
    }
}

impl Clone for SessionAgent {
    /// Fork the session onto a new span.
    ///
    /// The copy keeps the trace id, gets a fresh span id and its own lock,
    /// and shares the local user data, resolver and guest predicate.
    fn clone(&self) -> Self {
        let mut state = self.state.read().clone();
        state.span_id = self.ids.generate();

        Self {
            state: RwLock::new(state),
            resolver: self.resolver.clone(),
            ids: Arc::clone(&self.ids),
            user_data: RwLock::new(self.user_data.read().clone()),
            judge_guest: RwLock::new(self.judge_guest.read().clone()),
        }
    }
}

impl fmt::Debug for SessionAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAgent")
            .field("state", &*self.state.read())
            .field("configured", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}
