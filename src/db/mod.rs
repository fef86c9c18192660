/// Persistent storage for sessions.
/// The registry writes every mutated session through a `SessionStore` and
/// restores from it on startup. SQLite is the bundled implementation.

pub mod init;

use crate::error::{Result, ServiceError};
use crate::models::{Participant, Session, SessionState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Storage backend for session snapshots
pub trait SessionStore: Send + Sync {
    /// Insert or replace the full session, participants included
    fn save(&self, session: &Session) -> Result<()>;

    /// Load every persisted session
    fn load_all(&self) -> Result<Vec<Session>>;
}

/// SQLite-backed session store
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        init::initialize_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init::initialize_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_participants(conn: &Connection, session_id: &str) -> Result<Vec<Participant>> {
        let mut stmt = conn.prepare(
            "SELECT public_key, joined_at, acknowledged FROM participants
             WHERE session_id = ?1 ORDER BY position ASC",
        )?;

        let participants = stmt
            .query_map(params![session_id], |row| {
                Ok(Participant {
                    public_key: row.get(0)?,
                    joined_at: row.get(1)?,
                    acknowledged: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(participants)
    }
}

impl SessionStore for SqliteSessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO sessions (session_id, owner_key, state, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.owner_key,
                session.state.as_str(),
                session.created_at
            ],
        )?;

        tx.execute(
            "DELETE FROM participants WHERE session_id = ?1",
            params![session.id],
        )?;

        for (position, participant) in session.participants.iter().enumerate() {
            tx.execute(
                "INSERT INTO participants (session_id, position, public_key, joined_at, acknowledged)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id,
                    position as i64,
                    participant.public_key,
                    participant.joined_at,
                    participant.acknowledged
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock()?;

        let mut stmt = conn.prepare(
            "SELECT session_id, owner_key, state, created_at FROM sessions ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut sessions = Vec::with_capacity(rows.len());
        for (id, owner_key, state, created_at) in rows {
            let state = SessionState::from_str(&state).ok_or_else(|| {
                ServiceError::Internal(format!("session {} has unknown state '{}'", id, state))
            })?;
            let participants = Self::load_participants(&conn, &id)?;

            if participants.first().map(|p| p.public_key.as_str()) != Some(owner_key.as_str()) {
                return Err(ServiceError::Internal(format!(
                    "session {} is not headed by its owner",
                    id
                )));
            }

            sessions.push(Session {
                id,
                owner_key,
                participants,
                state,
                created_at,
            });
        }

        Ok(sessions)
    }
}
