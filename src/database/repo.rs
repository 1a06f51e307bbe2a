use std::path::Path;

use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::debug;

use crate::database::error::Result;
use crate::database::schema::SCHEMA;

pub type FileId = i64;
pub type TagId = i64;

/// One imported file as persisted in `t_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub file_name: String,
    pub file_path: String,
    pub import_time: Option<String>,
}

/// A real tag together with the dimension that owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TagRef {
    pub tag_id: TagId,
    pub dimension: String,
    pub name: String,
}

/// Handle on the metadata database.
///
/// Opened once at startup and passed by reference to the taxonomy,
/// association and query components. The store assumes a single writer:
/// no locking protocol exists beyond SQLite's own file locks, so running
/// two writing processes against one database is unsupported.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!("Opened metadata store at {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Starts a scoped transaction. Dropping it without `commit()` rolls
    /// back, so every early return leaves the store untouched.
    ///
    /// Transactions do not nest; helpers that run inside one take a
    /// `&Connection` instead of opening their own.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
