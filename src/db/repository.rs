use std::sync::atomic::{AtomicI64, Ordering};

use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{now_millis, Session, SessionSummary, Turn};

use super::schema::SCHEMA;

/// Durable conversation storage, one row per session id.
pub struct SessionStore {
    conn: Connection,
    // Highest lastUpdatedAt handed out so far; keeps stamps strictly
    // increasing even when two writes land in the same millisecond.
    last_stamp: AtomicI64,
}

struct SessionRow {
    id: String,
    original_url: String,
    original_title: Option<String>,
    created_at: i64,
    last_updated_at: i64,
    turns: String,
}

impl SessionStore {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        let last_stamp = conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                let max: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(last_updated_at), 0) FROM sessions",
                    [],
                    |row| row.get(0),
                )?;
                Ok(max)
            })
            .await?;

        Ok(Self {
            conn,
            last_stamp: AtomicI64::new(last_stamp),
        })
    }

    fn next_stamp(&self) -> i64 {
        let now = now_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        now.max(prev + 1)
    }

    /// Insert-or-replace keyed by `session.id`. Stamps `last_updated_at` on
    /// the caller's value before writing.
    pub async fn upsert(&self, session: &mut Session) -> Result<String> {
        if session.id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "session must have an id".to_string(),
            ));
        }

        session.last_updated_at = self.next_stamp();

        let turns = serde_json::to_string(&session.turns)?;
        let id = session.id.clone();
        let url = session.original_url.clone();
        let title = session.original_title.clone();
        let created_at = session.created_at;
        let last_updated_at = session.last_updated_at;

        let key = id.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO sessions (id, original_url, original_title, created_at, last_updated_at, turns)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(id) DO UPDATE SET
                           original_url = excluded.original_url,
                           original_title = excluded.original_title,
                           created_at = excluded.created_at,
                           last_updated_at = excluded.last_updated_at,
                           turns = excluded.turns"#,
                    params![key, url, title, created_at, last_updated_at, turns],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        tracing::info!(session_id = %id, "Session saved");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, original_url, original_title, created_at, last_updated_at, turns FROM sessions WHERE id = ?1",
                )?;
                let row = stmt.query_row(params![id], session_row).optional()?;
                Ok(row)
            })
            .await?;

        row.map(session_from_row).transpose()
    }

    /// All sessions, most recently updated first, without their turns.
    pub async fn list_summaries(&self) -> Result<Vec<SessionSummary>> {
        let summaries = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, original_title, last_updated_at FROM sessions ORDER BY last_updated_at DESC, rowid DESC",
                )?;
                let summaries = stmt
                    .query_map([], |row| {
                        Ok(SessionSummary {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            last_updated_at: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(summaries)
            })
            .await?;
        Ok(summaries)
    }

    /// Deleting an unknown id is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let key = id.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM sessions WHERE id = ?1", params![key])?;
                Ok(n)
            })
            .await?;
        tracing::info!(session_id = %id, removed, "Session deleted");
        Ok(())
    }
}

fn session_row(row: &Row) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        original_url: row.get(1)?,
        original_title: row.get(2)?,
        created_at: row.get(3)?,
        last_updated_at: row.get(4)?,
        turns: row.get(5)?,
    })
}

fn session_from_row(row: SessionRow) -> Result<Session> {
    let turns: Vec<Turn> = serde_json::from_str(&row.turns)?;
    Ok(Session {
        id: row.id,
        original_url: row.original_url,
        original_title: row.original_title,
        created_at: row.created_at,
        last_updated_at: row.last_updated_at,
        turns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn session(id: &str, turns: &[(Role, &str)]) -> Session {
        Session {
            id: id.to_string(),
            original_url: "https://x".to_string(),
            original_title: Some(format!("Doc {}", id)),
            created_at: 1_700_000_000_000,
            last_updated_at: 0,
            turns: turns
                .iter()
                .enumerate()
                .map(|(i, (role, text))| Turn::new(*role, *text, Some(i as i64)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_returns_same_session() {
        let store = SessionStore::in_memory().await.unwrap();
        let mut s = session("a", &[(Role::User, "explain"), (Role::Model, "# Hi")]);
        let original = s.clone();

        let before = now_millis();
        let id = store.upsert(&mut s).await.unwrap();
        assert_eq!(id, "a");
        assert!(s.last_updated_at >= before);

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded, s);
        assert_eq!(
            Session {
                last_updated_at: 0,
                ..loaded
            },
            original
        );
    }

    #[tokio::test]
    async fn upsert_overrides_caller_timestamp() {
        let store = SessionStore::in_memory().await.unwrap();
        let mut s = session("a", &[(Role::User, "q")]);
        s.last_updated_at = 42;
        store.upsert(&mut s).await.unwrap();
        assert!(s.last_updated_at > 42);
    }

    #[tokio::test]
    async fn upsert_without_id_is_rejected() {
        let store = SessionStore::in_memory().await.unwrap();
        let mut s = session("", &[(Role::User, "q")]);
        let err = store.upsert(&mut s).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert!(store.list_summaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = SessionStore::in_memory().await.unwrap();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summaries_are_most_recent_first() {
        let store = SessionStore::in_memory().await.unwrap();
        for id in ["a", "b", "c"] {
            store
                .upsert(&mut session(id, &[(Role::User, "q")]))
                .await
                .unwrap();
        }
        // touching "a" moves it to the front
        let mut a = store.get("a").await.unwrap().unwrap();
        store.upsert(&mut a).await.unwrap();

        let summaries = store.list_summaries().await.unwrap();
        let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(summaries
            .windows(2)
            .all(|w| w[0].last_updated_at > w[1].last_updated_at));
        assert_eq!(summaries[0].title.as_deref(), Some("Doc a"));
    }

    #[tokio::test]
    async fn upsert_same_id_replaces() {
        let store = SessionStore::in_memory().await.unwrap();
        store
            .upsert(&mut session("a", &[(Role::User, "first")]))
            .await
            .unwrap();
        assert_eq!(store.list_summaries().await.unwrap().len(), 1);

        let mut replacement = session(
            "a",
            &[(Role::User, "first"), (Role::Model, "answer"), (Role::User, "more")],
        );
        store.upsert(&mut replacement).await.unwrap();

        let summaries = store.list_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "a");
        assert_eq!(store.get("a").await.unwrap().unwrap().turns.len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_missing() {
        let store = SessionStore::in_memory().await.unwrap();
        store
            .upsert(&mut session("a", &[(Role::User, "q")]))
            .await
            .unwrap();

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        store.delete("a").await.unwrap();
        store.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let path = path.to_string_lossy().to_string();

        let stamp = {
            let store = SessionStore::new(&path).await.unwrap();
            let mut s = session("a", &[(Role::User, "q"), (Role::Model, "a")]);
            store.upsert(&mut s).await.unwrap();
            s.last_updated_at
        };

        let store = SessionStore::new(&path).await.unwrap();
        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.last_updated_at, stamp);

        let mut b = session("b", &[(Role::User, "q")]);
        store.upsert(&mut b).await.unwrap();
        assert!(b.last_updated_at > stamp);
    }
}
