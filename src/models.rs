/// Data models for sessions, participants and identities.
/// Also holds the serializable payloads handed across the boundary.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Active,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "Created",
            SessionState::Active => "Active",
            SessionState::Closed => "Closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Created" => Some(SessionState::Created),
            "Active" => Some(SessionState::Active),
            "Closed" => Some(SessionState::Closed),
            _ => None,
        }
    }
}

/// A member of a session, identified by public key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub public_key: String,
    pub joined_at: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Participant {
    pub fn new(public_key: &str) -> Self {
        Participant {
            public_key: public_key.to_string(),
            joined_at: Utc::now(),
            acknowledged: false,
        }
    }
}

/// Authoritative session record, owned by the registry.
///
/// `participants` keeps join order with the owner at index 0 and never
/// holds the same key twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner_key: String,
    pub participants: Vec<Participant>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: &str, owner_key: &str) -> Self {
        Session {
            id: id.to_string(),
            owner_key: owner_key.to_string(),
            participants: vec![Participant::new(owner_key)],
            state: SessionState::Created,
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, key: &str) -> bool {
        self.participants.iter().any(|p| p.public_key == key)
    }

    pub fn participant_mut(&mut self, key: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.public_key == key)
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Participant keys in join order
    pub fn participant_keys(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|p| p.public_key.clone())
            .collect()
    }

    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            session_id: self.id.clone(),
            owner_key: self.owner_key.clone(),
            participants: self.participant_keys(),
            state: self.state,
        }
    }
}

// Boundary payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub session_id: String,
    pub owner_key: String,
    pub participants: Vec<String>,
    pub state: SessionState,
}

/// Freshly generated identity. Public and private halves travel together.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResult {
    pub is_ready: bool,
}
