use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use hilight_core::collab::SessionRecorder;
use hilight_core::error::HilightError;
use hilight_core::types::InboundContext;

use crate::db::init_db;
use crate::error::{Result, SessionError};
use crate::types::{InboundTurn, StoredSession};

/// Placeholder in the store path template replaced by the routed agent id.
pub const AGENT_ID_PLACEHOLDER: &str = "{agentId}";

/// SQLite-backed recorder for inbound relay turns.
///
/// Each agent gets its own database file; connections are opened lazily and
/// cached per path. Clones share the cache.
#[derive(Clone)]
pub struct SessionStore {
    path_template: Arc<str>,
    conns: Arc<DashMap<String, Arc<Mutex<Connection>>>>,
}

impl SessionStore {
    pub fn new(path_template: impl Into<String>) -> Self {
        Self {
            path_template: Arc::from(path_template.into()),
            conns: Arc::new(DashMap::new()),
        }
    }

    /// Expand the path template for `agent_id` (`~/` is resolved against `$HOME`).
    pub fn store_path_for(&self, agent_id: &str) -> String {
        let path = self.path_template.replace(AGENT_ID_PLACEHOLDER, agent_id);
        match path.strip_prefix("~/") {
            Some(rest) => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                format!("{home}/{rest}")
            }
            None => path,
        }
    }

    fn connection(&self, store_path: &str) -> Result<Arc<Mutex<Connection>>> {
        if let Some(conn) = self.conns.get(store_path) {
            return Ok(Arc::clone(conn.value()));
        }

        if let Some(parent) = Path::new(store_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!(path = %store_path, "opening session store");
        let conn = Connection::open(store_path)?;
        init_db(&conn)?;

        let entry = self
            .conns
            .entry(store_path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(conn)));
        Ok(Arc::clone(entry.value()))
    }

    /// Upsert the session row and append the inbound turn.
    #[instrument(skip(self, ctx), fields(store = %store_path, key = %session_key))]
    pub fn record_inbound(
        &self,
        store_path: &str,
        session_key: &str,
        ctx: &InboundContext,
    ) -> Result<StoredSession> {
        let conn = self.connection(store_path)?;
        let db = lock(&conn);
        let now = chrono::Utc::now().to_rfc3339();
        let context_json = serde_json::to_string(ctx)?;
        let tx = db.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO sessions
             (id, session_key, account_id, peer_id, sender_name, message_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
             ON CONFLICT(session_key) DO UPDATE SET
                 sender_name   = excluded.sender_name,
                 message_count = message_count + 1,
                 updated_at    = excluded.updated_at",
            rusqlite::params![
                Uuid::now_v7().to_string(),
                session_key,
                ctx.account_id,
                ctx.from,
                ctx.sender_name,
                now
            ],
        )?;

        tx.execute(
            "INSERT INTO inbound_turns (id, session_key, provider, body, context, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                Uuid::now_v7().to_string(),
                session_key,
                ctx.provider,
                ctx.body,
                context_json,
                now
            ],
        )?;

        let session = get_session(&tx, session_key)?.ok_or_else(|| SessionError::NotFound {
            key: session_key.to_string(),
        })?;
        tx.commit()?;
        Ok(session)
    }

    /// Retrieve a session by key, returning `None` if it does not exist.
    #[instrument(skip(self), fields(store = %store_path, key = %session_key))]
    pub fn get(&self, store_path: &str, session_key: &str) -> Result<Option<StoredSession>> {
        let conn = self.connection(store_path)?;
        let db = lock(&conn);
        get_session(&db, session_key)
    }

    /// Most recent inbound turns for a session, newest first.
    #[instrument(skip(self), fields(store = %store_path, key = %session_key, limit))]
    pub fn recent_turns(
        &self,
        store_path: &str,
        session_key: &str,
        limit: usize,
    ) -> Result<Vec<InboundTurn>> {
        let conn = self.connection(store_path)?;
        let db = lock(&conn);
        let mut stmt = db.prepare(
            "SELECT id, session_key, provider, body, context, received_at
             FROM inbound_turns
             WHERE session_key = ?1
             ORDER BY received_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_key, limit as i64], |row| {
            let context: String = row.get(4)?;
            Ok(InboundTurn {
                id: row.get(0)?,
                session_key: row.get(1)?,
                provider: row.get(2)?,
                body: row.get(3)?,
                context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
                received_at: row.get(5)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[async_trait]
impl SessionRecorder for SessionStore {
    fn resolve_store_path(&self, agent_id: &str) -> String {
        self.store_path_for(agent_id)
    }

    async fn record_inbound_session(
        &self,
        store_path: &str,
        session_key: &str,
        ctx: &InboundContext,
    ) -> hilight_core::Result<()> {
        // SQLite and directory creation block; keep them off the runtime workers.
        let store = self.clone();
        let store_path = store_path.to_string();
        let session_key = session_key.to_string();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || store.record_inbound(&store_path, &session_key, &ctx))
            .await
            .map_err(|e| HilightError::Session(format!("session task failed: {e}")))?
            .map(|_| ())
            .map_err(|e| HilightError::Session(e.to_string()))
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn get_session(db: &Connection, session_key: &str) -> Result<Option<StoredSession>> {
    match db.query_row(
        "SELECT id, session_key, account_id, peer_id, sender_name, message_count,
                created_at, updated_at
         FROM sessions WHERE session_key = ?1",
        rusqlite::params![session_key],
        row_to_session,
    ) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(SessionError::Database(e)),
    }
}

/// Map a SQLite row to a `StoredSession`.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredSession> {
    Ok(StoredSession {
        id: row.get(0)?,
        session_key: row.get(1)?,
        account_id: row.get(2)?,
        peer_id: row.get(3)?,
        sender_name: row.get(4)?,
        message_count: row.get::<_, i64>(5)? as u32,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
