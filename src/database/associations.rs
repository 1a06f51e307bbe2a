use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::database::error::Result;
use crate::database::repo::{FileId, FileRecord, Store, TagId, TagRef};

/// Owns the file <-> tag edge set and the file records it hangs off.
///
/// No edge may outlive either endpoint: every delete here removes the
/// edges explicitly, even though fresh schemas also cascade, because
/// databases created by older versions have no cascading foreign keys.
pub struct Associations<'s> {
    store: &'s Store,
}

impl<'s> Associations<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn register_file(&self, display_name: &str, persisted_path: &str) -> Result<FileId> {
        let tx = self.store.transaction()?;
        let file_id = insert_file(&tx, display_name, persisted_path)?;
        tx.commit()?;
        Ok(file_id)
    }

    /// Registers a file and attaches `tag_ids` to it as one unit.
    pub fn register_tagged(
        &self,
        display_name: &str,
        persisted_path: &str,
        tag_ids: &BTreeSet<TagId>,
    ) -> Result<FileId> {
        let tx = self.store.transaction()?;
        let file_id = insert_file(&tx, display_name, persisted_path)?;
        let attached = attach_edges(&tx, file_id, tag_ids)?;
        tx.commit()?;
        info!("Registered file {} ({}) with {} tags", file_id, display_name, attached);
        Ok(file_id)
    }

    /// Returns the number of edges actually inserted.
    pub fn attach(&self, file_id: FileId, tag_ids: &BTreeSet<TagId>) -> Result<usize> {
        let tx = self.store.transaction()?;
        let attached = attach_edges(&tx, file_id, tag_ids)?;
        tx.commit()?;
        Ok(attached)
    }

    pub fn detach_all_for_tag(&self, tag_id: TagId) -> Result<usize> {
        let tx = self.store.transaction()?;
        let removed = detach_tag(&tx, tag_id)?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn detach_all_for_dimension(&self, dimension: &str) -> Result<usize> {
        let tx = self.store.transaction()?;
        let removed = detach_dimension(&tx, dimension)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Deletes a file record and every edge touching it. Returns false if
    /// the id was unknown.
    pub fn delete_file(&self, file_id: FileId) -> Result<bool> {
        let tx = self.store.transaction()?;
        tx.execute("DELETE FROM t_files_tags WHERE file_id = ?1", params![file_id])?;
        let deleted = tx.execute("DELETE FROM t_files WHERE file_id = ?1", params![file_id])?;
        tx.commit()?;
        if deleted > 0 {
            info!("Deleted file record {}", file_id);
        }
        Ok(deleted > 0)
    }

    pub fn file(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        let record = self
            .store
            .conn()
            .query_row(
                "SELECT file_id, file_name, file_path, import_time FROM t_files WHERE file_id = ?1",
                params![file_id],
                |row| {
                    Ok(FileRecord {
                        file_id: row.get(0)?,
                        file_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        file_path: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        import_time: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn tags_of(&self, file_id: FileId) -> Result<Vec<TagRef>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT t.tag_id, t.parent, t.name
             FROM t_files_tags ft
             JOIN t_tags t ON ft.tag_id = t.tag_id
             WHERE ft.file_id = ?1 AND t.name <> ''
             ORDER BY t.parent, t.name",
        )?;
        let tags = stmt
            .query_map(params![file_id], |row| {
                Ok(TagRef {
                    tag_id: row.get(0)?,
                    dimension: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    pub fn files_with(&self, tag_id: TagId) -> Result<Vec<FileId>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT file_id FROM t_files_tags WHERE tag_id = ?1 ORDER BY file_id",
        )?;
        let ids = stmt
            .query_map(params![tag_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

fn insert_file(conn: &Connection, display_name: &str, persisted_path: &str) -> Result<FileId> {
    conn.execute(
        "INSERT INTO t_files (file_name, file_path) VALUES (?1, ?2)",
        params![display_name, persisted_path],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn attach_edges(
    conn: &Connection,
    file_id: FileId,
    tag_ids: &BTreeSet<TagId>,
) -> Result<usize> {
    let mut stmt_tag_exists = conn.prepare("SELECT 1 FROM t_tags WHERE tag_id = ?1")?;
    let mut stmt_attached =
        conn.prepare("SELECT 1 FROM t_files_tags WHERE file_id = ?1 AND tag_id = ?2")?;
    let mut stmt_insert =
        conn.prepare("INSERT INTO t_files_tags (file_id, tag_id) VALUES (?1, ?2)")?;

    let mut attached = 0;
    for &tag_id in tag_ids {
        if !stmt_tag_exists.exists(params![tag_id])? {
            debug!("Skipping unknown tag id {} for file {}", tag_id, file_id);
            continue;
        }
        if stmt_attached.exists(params![file_id, tag_id])? {
            continue;
        }
        stmt_insert.execute(params![file_id, tag_id])?;
        attached += 1;
    }
    Ok(attached)
}

pub(crate) fn detach_tag(conn: &Connection, tag_id: TagId) -> Result<usize> {
    Ok(conn.execute("DELETE FROM t_files_tags WHERE tag_id = ?1", params![tag_id])?)
}

pub(crate) fn detach_dimension(conn: &Connection, dimension: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM t_files_tags
         WHERE tag_id IN (SELECT tag_id FROM t_tags WHERE parent = ?1)",
        params![dimension],
    )?)
}

/// Re-points every edge of `from` onto `onto`, dropping edges that would
/// duplicate one `onto` already has.
pub(crate) fn move_edges(conn: &Connection, from: TagId, onto: TagId) -> Result<()> {
    let mut stmt = conn.prepare("SELECT DISTINCT file_id FROM t_files_tags WHERE tag_id = ?1")?;
    let files = stmt
        .query_map(params![from], |row| row.get::<_, FileId>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let target = BTreeSet::from([onto]);
    for file_id in files {
        attach_edges(conn, file_id, &target)?;
    }
    detach_tag(conn, from)?;
    Ok(())
}
