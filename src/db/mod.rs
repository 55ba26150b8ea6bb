pub mod blob;
pub mod models;

use models::{Book, Conversation, Message, NewBook, ProcessedText, Role, Summary};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

const BOOK_COLUMNS: &str = "b.id, b.title, b.pdf_url, b.text, b.info, b.total_pages, b.created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, audio_url, created_at";
const SUMMARY_COLUMNS: &str =
    "id, book_id, page_start, page_end, content, audio_url, created_at";

/// Row store for books, conversations, messages and summaries.
///
/// Every method is one statement against the connection; nothing spans a
/// transaction, so a failure between two calls leaves the first write in place.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn migrate(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                pdf_url TEXT,
                text TEXT NOT NULL,
                info TEXT NOT NULL DEFAULT '{}',
                total_pages INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                audio_url TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS messages_by_conversation
                ON messages (conversation_id, created_at);

            CREATE TABLE IF NOT EXISTS summaries (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                page_start INTEGER NOT NULL,
                page_end INTEGER NOT NULL,
                content TEXT NOT NULL,
                audio_url TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX IF NOT EXISTS summaries_by_range
                ON summaries (book_id, page_start, page_end);
            ",
        )?;
        Ok(())
    }

    // ── Books ──

    pub fn create_book(&self, book: &NewBook<'_>) -> StoreResult<Book> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let info = serde_json::to_string(&book.processed_text.info)
            .unwrap_or_else(|_| "{}".to_string());
        conn.execute(
            "INSERT INTO books (id, title, text, info, total_pages) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                book.title,
                book.processed_text.text,
                info,
                book.total_pages
            ],
        )?;
        let book = conn.query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = ?1"),
            params![id],
            |row| book_from_row(row, 0),
        )?;
        Ok(book)
    }

    pub fn get_book(&self, id: &str) -> StoreResult<Option<Book>> {
        let conn = self.conn()?;
        let book = conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = ?1"),
                params![id],
                |row| book_from_row(row, 0),
            )
            .optional()?;
        Ok(book)
    }

    pub fn set_book_pdf_url(&self, id: &str, pdf_url: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE books SET pdf_url = ?1 WHERE id = ?2",
            params![pdf_url, id],
        )?;
        Ok(())
    }

    // ── Conversations ──

    pub fn create_conversation(&self, book_id: &str) -> StoreResult<Conversation> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO conversations (id, book_id) VALUES (?1, ?2)",
            params![id, book_id],
        )?;
        let conv = conn.query_row(
            "SELECT id, book_id, created_at FROM conversations WHERE id = ?1",
            params![id],
            |row| conversation_from_row(row, 0),
        )?;
        Ok(conv)
    }

    pub fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn()?;
        let conv = conn
            .query_row(
                "SELECT id, book_id, created_at FROM conversations WHERE id = ?1",
                params![id],
                |row| conversation_from_row(row, 0),
            )
            .optional()?;
        Ok(conv)
    }

    /// Oldest conversation for a book; books normally carry exactly one.
    pub fn get_conversation_by_book(&self, book_id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn()?;
        let conv = conn
            .query_row(
                "SELECT id, book_id, created_at FROM conversations
                 WHERE book_id = ?1 ORDER BY created_at ASC, rowid ASC LIMIT 1",
                params![book_id],
                |row| conversation_from_row(row, 0),
            )
            .optional()?;
        Ok(conv)
    }

    pub fn get_conversation_with_book(
        &self,
        id: &str,
    ) -> StoreResult<Option<(Conversation, Book)>> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                &format!(
                    "SELECT c.id, c.book_id, c.created_at, {BOOK_COLUMNS}
                     FROM conversations c JOIN books b ON b.id = c.book_id
                     WHERE c.id = ?1"
                ),
                params![id],
                |row| Ok((conversation_from_row(row, 0)?, book_from_row(row, 3)?)),
            )
            .optional()?;
        Ok(found)
    }

    // ── Messages ──

    pub fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> StoreResult<Message> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content) VALUES (?1, ?2, ?3, ?4)",
            params![id, conversation_id, role.as_str(), content],
        )?;
        let msg = conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![id],
            message_from_row,
        )?;
        Ok(msg)
    }

    /// All messages of a conversation, oldest first.
    pub fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id], message_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The `limit` most recent messages, newest first.
    pub fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![conversation_id, limit], message_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ── Summaries ──

    pub fn get_summary(
        &self,
        book_id: &str,
        page_start: i64,
        page_end: i64,
    ) -> StoreResult<Option<Summary>> {
        let conn = self.conn()?;
        let summary = conn
            .query_row(
                &format!(
                    "SELECT {SUMMARY_COLUMNS} FROM summaries
                     WHERE book_id = ?1 AND page_start = ?2 AND page_end = ?3"
                ),
                params![book_id, page_start, page_end],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// Insert a summary, or return the row already stored for the same range.
    ///
    /// Two requests that both missed the cache race here; the unique index
    /// keeps the first write and the loser gets that row back.
    pub fn create_summary(
        &self,
        book_id: &str,
        page_start: i64,
        page_end: i64,
        content: &str,
    ) -> StoreResult<Summary> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO summaries (id, book_id, page_start, page_end, content)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (book_id, page_start, page_end) DO NOTHING",
            params![id, book_id, page_start, page_end, content],
        )?;
        let summary = conn.query_row(
            &format!(
                "SELECT {SUMMARY_COLUMNS} FROM summaries
                 WHERE book_id = ?1 AND page_start = ?2 AND page_end = ?3"
            ),
            params![book_id, page_start, page_end],
            summary_from_row,
        )?;
        Ok(summary)
    }
}

fn book_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Book> {
    let info: String = row.get(offset + 4)?;
    let info = serde_json::from_str(&info).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(offset + 4, Type::Text, Box::new(e))
    })?;
    let total_pages: u32 = row.get(offset + 5)?;
    Ok(Book {
        id: row.get(offset)?,
        title: row.get(offset + 1)?,
        pdf_url: row.get(offset + 2)?,
        processed_text: ProcessedText {
            text: row.get(offset + 3)?,
            pages: total_pages,
            info,
        },
        total_pages,
        created_at: row.get(offset + 6)?,
    })
}

fn conversation_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(offset)?,
        book_id: row.get(offset + 1)?,
        created_at: row.get(offset + 2)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let role = Role::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown role: {role}").into(),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        audio_url: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<Summary> {
    Ok(Summary {
        id: row.get(0)?,
        book_id: row.get(1)?,
        page_start: row.get(2)?,
        page_end: row.get(3)?,
        content: row.get(4)?,
        audio_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}
