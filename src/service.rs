/// Service facade
///
/// The single entry point used by the boundary layer. Sequences calls into
/// the identity manager, registry and membership coordinator and turns every
/// outcome into a status code plus optional payload. Nothing below this
/// layer escapes as a panic or a raw error.
///
/// After an internal invariant violation (poisoned lock, caught panic) the
/// facade fails closed: every later call answers `InternalError` until a new
/// instance is built.
use crate::db::SessionStore;
use crate::error::{Result, StatusCode};
use crate::identity::IdentityManager;
use crate::membership::{Departure, MembershipCoordinator};
use crate::models::{AckResult, KeyPair, SessionDescriptor};
use crate::registry::SessionRegistry;
use crate::sink::{EventSink, LogSink};
use serde::Serialize;
use serde_json::json;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status code plus payload, as returned across the boundary
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse<T> {
    pub status: StatusCode,
    pub payload: Option<T>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(payload: T) -> Self {
        ServiceResponse {
            status: StatusCode::Ok,
            payload: Some(payload),
        }
    }

    pub fn error(status: StatusCode) -> Self {
        ServiceResponse {
            status,
            payload: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

impl<T: Serialize> ServiceResponse<T> {
    /// Payload as JSON text, `None` when there is no payload
    pub fn payload_json(&self) -> Option<String> {
        self.payload
            .as_ref()
            .and_then(|payload| serde_json::to_string(payload).ok())
    }

    /// `{"status": <code>, "payload": <payload or null>}`
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "status": self.status.code(),
            "payload": self.payload,
        })
    }
}

pub struct SessionService {
    registry: SessionRegistry,
    events: EventSink,
    failed: AtomicBool,
}

impl SessionService {
    /// Memory-only service
    pub fn new() -> Self {
        Self::from_registry(SessionRegistry::new())
    }

    /// Service whose sessions are restored from and written through to `store`
    pub fn with_store(store: Arc<dyn SessionStore>) -> Result<Self> {
        Ok(Self::from_registry(SessionRegistry::with_store(store)?))
    }

    fn from_registry(registry: SessionRegistry) -> Self {
        SessionService {
            registry,
            events: EventSink::new(),
            failed: AtomicBool::new(false),
        }
    }

    pub fn generate_key_pair(&self) -> ServiceResponse<KeyPair> {
        self.run("generate_key_pair", IdentityManager::generate_key_pair)
    }

    pub fn create_session(
        &self,
        session_id: Option<&str>,
        owner_key: &str,
    ) -> ServiceResponse<SessionDescriptor> {
        let response = self.run("create_session", || {
            self.registry
                .create_session(session_id, owner_key)
                .map(|session| session.descriptor())
        });
        if let Some(descriptor) = &response.payload {
            self.events.emit(&format!(
                "session {} created by {}",
                descriptor.session_id, descriptor.owner_key
            ));
        }
        response
    }

    pub fn join_session(
        &self,
        session_id: &str,
        participant_key: &str,
    ) -> ServiceResponse<SessionDescriptor> {
        let response = self.run("join_session", || {
            MembershipCoordinator::new(&self.registry)
                .join_session(session_id, participant_key)
                .map(|session| session.descriptor())
        });
        if let Some(descriptor) = &response.payload {
            self.events.emit(&format!(
                "{} joined session {} ({} participants)",
                participant_key,
                session_id,
                descriptor.participants.len()
            ));
        }
        response
    }

    pub fn list_participants(&self, session_id: &str) -> ServiceResponse<Vec<String>> {
        self.run("list_participants", || {
            MembershipCoordinator::new(&self.registry).list_participants(session_id)
        })
    }

    pub fn acknowledge(
        &self,
        session_id: &str,
        participant_key: &str,
        stored_participant_count: i32,
    ) -> ServiceResponse<AckResult> {
        let mut newly_acknowledged = false;
        let response = self.run("acknowledge", || {
            let ack = MembershipCoordinator::new(&self.registry).acknowledge(
                session_id,
                participant_key,
                i64::from(stored_participant_count),
            )?;
            newly_acknowledged = ack.newly_acknowledged;
            Ok(AckResult {
                is_ready: ack.is_ready,
            })
        });

        if let Some(ack) = &response.payload {
            if newly_acknowledged {
                self.events.emit(&format!(
                    "{} acknowledged session {}",
                    participant_key, session_id
                ));
            }
            if ack.is_ready {
                self.events
                    .emit(&format!("session {} is ready for {}", session_id, participant_key));
            }
        }
        response
    }

    pub fn get_session(&self, session_id: &str) -> ServiceResponse<SessionDescriptor> {
        self.run("get_session", || {
            self.registry
                .lookup(session_id)
                .map(|session| session.descriptor())
        })
    }

    pub fn close_session(&self, session_id: &str) -> ServiceResponse<()> {
        let response = self.run("close_session", || self.registry.close(session_id));
        if response.is_ok() {
            self.events.emit(&format!("session {} closed", session_id));
        }
        response
    }

    pub fn leave_session(
        &self,
        session_id: &str,
        participant_key: &str,
    ) -> ServiceResponse<SessionDescriptor> {
        let mut closed = false;
        let response = self.run("leave_session", || {
            let departure =
                MembershipCoordinator::new(&self.registry).leave_session(session_id, participant_key)?;
            let session = match departure {
                Departure::Left(session) => session,
                Departure::Closed(session) => {
                    closed = true;
                    session
                }
            };
            Ok(session.descriptor())
        });

        if response.is_ok() {
            self.events
                .emit(&format!("{} left session {}", participant_key, session_id));
            if closed {
                self.events.emit(&format!("session {} closed", session_id));
            }
        }
        response
    }

    /// Register the log callback. Only one may be active at a time.
    pub fn register_log_callback<S>(&self, sink: S) -> ServiceResponse<()>
    where
        S: LogSink + 'static,
    {
        let sink: Arc<dyn LogSink> = Arc::new(sink);
        let response = self.run("register_log_callback", || self.events.register(sink));
        if response.is_ok() {
            self.events.emit("log callback registered");
        }
        response
    }

    pub fn unregister_log_callback(&self) -> ServiceResponse<bool> {
        self.run("unregister_log_callback", || self.events.unregister())
    }

    pub fn session_count(&self) -> ServiceResponse<usize> {
        self.run("session_count", || self.registry.len())
    }

    /// True once the service has failed closed
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn run<T>(&self, operation: &str, f: impl FnOnce() -> Result<T>) -> ServiceResponse<T> {
        if self.has_failed() {
            log::error!("Refusing {}: service has failed closed", operation);
            return ServiceResponse::error(StatusCode::InternalError);
        }

        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => ServiceResponse::ok(value),
            Ok(Err(e)) => {
                if e.is_fatal() {
                    log::error!("{} hit an internal error, failing closed: {}", operation, e);
                    self.failed.store(true, Ordering::SeqCst);
                } else {
                    log::warn!("{} failed: {}", operation, e);
                }
                ServiceResponse::error(e.status())
            }
            Err(_) => {
                log::error!("{} panicked, failing closed", operation);
                self.failed.store(true, Ordering::SeqCst);
                ServiceResponse::error(StatusCode::InternalError)
            }
        }
    }
}

impl Default for SessionService {
    fn default() -> Self {
        Self::new()
    }
}
