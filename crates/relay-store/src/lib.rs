//! # relay-store
//!
//! Durable storage for chat links.
//!
//! [`LinkStore`] is the contract the relay engine depends on. Lookups are
//! cardinality-aware: by source chat yields zero or one link, by target chat
//! yields zero or more. A miss is `Ok(None)` or an empty list, never an error.
//!
//! [`SqliteLinkStore`] is the SQLite implementation. A UNIQUE index on
//! `source_chat_id` guards the one-link-per-source invariant.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, Row};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use relay_core::chat::ChatId;
use relay_core::error::{RelayError, Result};
use relay_core::link::{Link, NewLink};

/// Persistence contract for links.
pub trait LinkStore {
    /// The link whose source is `chat_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the backing store fails.
    fn find_by_source(&self, chat_id: ChatId) -> Result<Option<Link>>;

    /// Every link whose target is `chat_id`. Order is not significant.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the backing store fails.
    fn find_all_by_target(&self, chat_id: ChatId) -> Result<Vec<Link>>;

    /// The link with the given code, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the backing store fails.
    fn find_by_id(&self, code: &str) -> Result<Option<Link>>;

    /// Assign an id and creation time, persist, and return the stored link.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateSource`] if the source chat already has
    /// a link, or [`RelayError::Persistence`] if the backing store fails.
    fn create(&mut self, new_link: NewLink) -> Result<Link>;

    /// Persist changes to an existing link.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateSource`] if the new source chat is
    /// already used by another link, or [`RelayError::Persistence`] if the
    /// link does not exist or the backing store fails.
    fn save(&mut self, link: &Link) -> Result<()>;

    /// Remove a link permanently.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the backing store fails.
    fn delete(&mut self, link: &Link) -> Result<()>;

    /// All links, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the backing store fails.
    fn list_all(&self) -> Result<Vec<Link>>;
}

const LINK_COLUMNS: &str =
    "id, source_chat_id, target_chat_id, creator_user_id, creator_first_name, created_at";

/// SQLite-backed [`LinkStore`].
pub struct SqliteLinkStore {
    conn: Connection,
}

impl SqliteLinkStore {
    /// Open or create a link database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(persistence)?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(persistence)?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS chat_links (
                id TEXT PRIMARY KEY,
                source_chat_id INTEGER NOT NULL,
                target_chat_id INTEGER,
                creator_user_id INTEGER NOT NULL,
                creator_first_name TEXT,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_links_source ON chat_links(source_chat_id);
            CREATE INDEX IF NOT EXISTS idx_chat_links_target ON chat_links(target_chat_id);
            ",
            )
            .map_err(persistence)?;

        Ok(())
    }

    /// Number of stored links.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the query fails.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chat_links", [], |row| row.get(0))
            .map_err(persistence)?;
        Ok(count as u64)
    }

    fn query_links(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Link>> {
        let mut stmt = self.conn.prepare(sql).map_err(persistence)?;
        let links = stmt
            .query_map(params, link_from_row)
            .map_err(persistence)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(persistence)?;
        Ok(links)
    }
}

impl LinkStore for SqliteLinkStore {
    fn find_by_source(&self, chat_id: ChatId) -> Result<Option<Link>> {
        let mut links = self.query_links(
            &format!("SELECT {LINK_COLUMNS} FROM chat_links WHERE source_chat_id = ?1 ORDER BY created_at"),
            [chat_id],
        )?;
        if links.len() > 1 {
            warn!(
                source_chat_id = chat_id,
                matches = links.len(),
                "more than one link for source chat, using the oldest"
            );
        }
        Ok(if links.is_empty() {
            None
        } else {
            Some(links.swap_remove(0))
        })
    }

    fn find_all_by_target(&self, chat_id: ChatId) -> Result<Vec<Link>> {
        self.query_links(
            &format!("SELECT {LINK_COLUMNS} FROM chat_links WHERE target_chat_id = ?1"),
            [chat_id],
        )
    }

    fn find_by_id(&self, code: &str) -> Result<Option<Link>> {
        let mut links = self.query_links(
            &format!("SELECT {LINK_COLUMNS} FROM chat_links WHERE id = ?1"),
            [code],
        )?;
        Ok(links.pop())
    }

    fn create(&mut self, new_link: NewLink) -> Result<Link> {
        let link = Link {
            id: Uuid::new_v4().simple().to_string(),
            source_chat_id: new_link.source_chat_id,
            target_chat_id: None,
            creator_user_id: new_link.creator_user_id,
            creator_first_name: new_link.creator_first_name,
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                &format!("INSERT INTO chat_links ({LINK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    link.id,
                    link.source_chat_id,
                    link.target_chat_id,
                    link.creator_user_id,
                    link.creator_first_name,
                    link.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )
            .map_err(|e| write_error(e, link.source_chat_id))?;

        debug!(id = %link.id, source_chat_id = link.source_chat_id, "created link");
        Ok(link)
    }

    fn save(&mut self, link: &Link) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE chat_links SET source_chat_id = ?2, target_chat_id = ?3 WHERE id = ?1",
                params![link.id, link.source_chat_id, link.target_chat_id],
            )
            .map_err(|e| write_error(e, link.source_chat_id))?;

        if changed == 0 {
            return Err(RelayError::Persistence(format!(
                "link {} does not exist",
                link.id
            )));
        }
        Ok(())
    }

    fn delete(&mut self, link: &Link) -> Result<()> {
        self.conn
            .execute("DELETE FROM chat_links WHERE id = ?1", params![link.id])
            .map_err(persistence)?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Link>> {
        self.query_links(
            &format!("SELECT {LINK_COLUMNS} FROM chat_links ORDER BY created_at"),
            [],
        )
    }
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(Link {
        id: row.get(0)?,
        source_chat_id: row.get(1)?,
        target_chat_id: row.get(2)?,
        creator_user_id: row.get(3)?,
        creator_first_name: row.get(4)?,
        created_at,
    })
}

fn persistence(e: rusqlite::Error) -> RelayError {
    RelayError::Persistence(e.to_string())
}

fn write_error(e: rusqlite::Error, source_chat_id: ChatId) -> RelayError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => RelayError::DuplicateSource(source_chat_id),
        _ => persistence(e),
    }
}
