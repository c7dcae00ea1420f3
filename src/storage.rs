use crate::api::models::{Conversation, ConversationId};
use crate::error::Result;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn db_path() -> Option<PathBuf> {
    let proj = crate::config::project_dirs()?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// Caching the conversation list so the sidebar fills in before the network answers.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_dir(path)?;
        Self::init(Connection::open(path)?)
    }

    pub fn open_default() -> Result<Self> {
        let path = db_path().ok_or_else(|| rusqlite::Error::InvalidPath("no data dir".into()))?;
        Self::open(&path)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS conversations (
                company_id INTEGER NOT NULL,
                job_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                photo_url TEXT,
                status TEXT,
                last_message TEXT,
                time TEXT,
                updated_at INTEGER NOT NULL,
                raw_json TEXT,
                PRIMARY KEY (company_id, job_id)
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Replaces the cached list, keeping the server's order.
    pub fn replace_conversations(
        &mut self,
        conversations: &[Conversation],
        raws: Option<&[serde_json::Value]>,
    ) -> Result<()> {
        let now = now_secs();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM conversations", [])?;
        for (idx, c) in conversations.iter().enumerate() {
            let raw = raws
                .and_then(|r| r.get(idx))
                .and_then(|v| serde_json::to_string(v).ok());
            tx.execute(
                r#"
                INSERT INTO conversations
                    (company_id, job_id, position, name, photo_url, status, last_message, time, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(company_id, job_id) DO UPDATE SET
                    position=excluded.position,
                    name=excluded.name,
                    photo_url=excluded.photo_url,
                    status=excluded.status,
                    last_message=excluded.last_message,
                    time=excluded.time,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![
                    c.id.company_id as i64,
                    c.id.job_id as i64,
                    idx as i64,
                    c.name,
                    c.photo_url,
                    c.status,
                    c.last_message,
                    c.time,
                    now,
                    raw
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn conversations(&self, limit: Option<usize>) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn.prepare(
            "SELECT company_id, job_id, name, photo_url, status, last_message, time
             FROM conversations ORDER BY position ASC LIMIT ?1",
        )?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| {
            Ok(Conversation {
                id: ConversationId::new(row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64),
                name: row.get(2)?,
                photo_url: row.get(3)?,
                status: row.get(4)?,
                last_message: row.get(5)?,
                time: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM conversations", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conv(company: u64, job: u64, name: &str) -> Conversation {
        Conversation {
            id: ConversationId::new(company, job),
            name: name.to_string(),
            photo_url: Some(format!("https://img/{company}.png")),
            status: None,
            last_message: Some("hi".into()),
            time: Some("2024-05-16 10:00:00".into()),
        }
    }

    #[test]
    fn keeps_server_order_and_replaces() {
        let mut cache = Cache::open_in_memory().unwrap();
        let list = vec![conv(9, 1, "Zeta"), conv(1, 1, "Alpha"), conv(5, 2, "Mid")];
        let raws = vec![json!({"companyId": 9}), json!({"companyId": 1}), json!({"companyId": 5})];
        cache.replace_conversations(&list, Some(&raws)).unwrap();
        assert_eq!(cache.conversations(None).unwrap(), list);
        assert_eq!(cache.conversations(Some(2)).unwrap().len(), 2);

        let shorter = vec![conv(1, 1, "Alpha renamed")];
        cache.replace_conversations(&shorter, None).unwrap();
        assert_eq!(cache.conversations(None).unwrap(), shorter);

        cache.clear().unwrap();
        assert!(cache.conversations(None).unwrap().is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cache.sqlite");
        {
            let mut cache = Cache::open(&path).unwrap();
            cache.replace_conversations(&[conv(2, 3, "Acme")], None).unwrap();
        }
        let cache = Cache::open(&path).unwrap();
        assert_eq!(cache.conversations(None).unwrap()[0].id, ConversationId::new(2, 3));
    }
}
