//! Session membership
//!
//! Join, leave, acknowledge and participant listing. The coordinator keeps
//! no session state of its own; every read and write goes through the
//! registry's per-session accessors, so two joins on the same session are
//! applied one after the other against the live participant list.
//!
//! ## Readiness
//! A participant acknowledges once it has synced its local view of the
//! membership, reporting how many participants it has stored. The session
//! is ready for that caller when every registered participant has
//! acknowledged and the caller's count equals the registered count. A
//! caller whose view is missing a concurrent join therefore never sees
//! `is_ready == true`.

use crate::error::{Result, ServiceError};
use crate::models::{Participant, Session, SessionState};
use crate::registry::SessionRegistry;

/// Outcome of an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    pub is_ready: bool,
    /// False when the participant had already acknowledged
    pub newly_acknowledged: bool,
}

/// Outcome of a leave request
#[derive(Debug, Clone, PartialEq)]
pub enum Departure {
    /// A non-owner participant was removed
    Left(Session),
    /// The owner left, which closes the session
    Closed(Session),
}

pub struct MembershipCoordinator<'a> {
    registry: &'a SessionRegistry,
}

impl<'a> MembershipCoordinator<'a> {
    pub fn new(registry: &'a SessionRegistry) -> Self {
        MembershipCoordinator { registry }
    }

    /// Add `participant_key` to a session.
    ///
    /// Joining twice is a no-op that returns the unchanged session. The
    /// second distinct member moves the session from `Created` to `Active`.
    ///
    /// # Errors
    /// * `SessionNotFound` if the session does not exist
    /// * `SessionClosed` if the session is closed; nothing is changed
    pub fn join_session(&self, session_id: &str, participant_key: &str) -> Result<Session> {
        self.registry.update(session_id, |session| {
            if session.is_closed() {
                return Err(ServiceError::SessionClosed(session.id.clone()));
            }

            if session.is_member(participant_key) {
                log::debug!(
                    "{} already joined session {}, nothing to do",
                    participant_key,
                    session.id
                );
                return Ok(session.clone());
            }

            session.participants.push(Participant::new(participant_key));
            if session.state == SessionState::Created && session.participants.len() >= 2 {
                session.state = SessionState::Active;
            }

            log::info!(
                "{} joined session {} ({} participants)",
                participant_key,
                session.id,
                session.participants.len()
            );
            Ok(session.clone())
        })
    }

    /// Participant keys in join order, owner first
    pub fn list_participants(&self, session_id: &str) -> Result<Vec<String>> {
        self.registry
            .read(session_id, |session| session.participant_keys())
    }

    /// Record that `participant_key` has synced `stored_participant_count`
    /// participants and report whether the session is ready.
    ///
    /// # Errors
    /// * `SessionNotFound` if the session does not exist
    /// * `ParticipantNotFound` if the key never joined the session
    pub fn acknowledge(
        &self,
        session_id: &str,
        participant_key: &str,
        stored_participant_count: i64,
    ) -> Result<Acknowledgement> {
        self.registry.update(session_id, |session| {
            let id = session.id.clone();
            let participant = session.participant_mut(participant_key).ok_or_else(|| {
                ServiceError::ParticipantNotFound {
                    session_id: id,
                    key: participant_key.to_string(),
                }
            })?;

            let newly_acknowledged = !participant.acknowledged;
            participant.acknowledged = true;

            let registered = session.participants.len() as i64;
            let all_acknowledged = session.participants.iter().all(|p| p.acknowledged);
            let is_ready = all_acknowledged && registered == stored_participant_count;

            if !is_ready && all_acknowledged {
                log::warn!(
                    "Session {}: {} reported {} participants, registry has {}",
                    session.id,
                    participant_key,
                    stored_participant_count,
                    registered
                );
            }

            Ok(Acknowledgement {
                is_ready,
                newly_acknowledged,
            })
        })
    }

    /// Remove `participant_key` from a session. When the owner leaves, the
    /// session is closed instead and keeps its participant list.
    ///
    /// # Errors
    /// * `SessionNotFound` if the session does not exist
    /// * `SessionClosed` if the session is already closed
    /// * `ParticipantNotFound` if the key is not a member
    pub fn leave_session(&self, session_id: &str, participant_key: &str) -> Result<Departure> {
        self.registry.update(session_id, |session| {
            if session.is_closed() {
                return Err(ServiceError::SessionClosed(session.id.clone()));
            }
            if !session.is_member(participant_key) {
                return Err(ServiceError::ParticipantNotFound {
                    session_id: session.id.clone(),
                    key: participant_key.to_string(),
                });
            }

            if session.owner_key == participant_key {
                session.state = SessionState::Closed;
                log::info!("Owner left session {}, closing it", session.id);
                return Ok(Departure::Closed(session.clone()));
            }

            session.participants.retain(|p| p.public_key != participant_key);
            log::info!("{} left session {}", participant_key, session.id);
            Ok(Departure::Left(session.clone()))
        })
    }
}
