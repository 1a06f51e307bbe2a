//! Dimension and tag vocabulary.
//!
//! There is no dimension table. A dimension exists as long as at least one
//! `t_tags` row carries its name, and an otherwise empty dimension is kept
//! alive by a sentinel row whose tag name is the empty string. Names are
//! compared byte for byte; trimming belongs to the caller.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::database::associations::{detach_dimension, detach_tag, move_edges};
use crate::database::error::Result;
use crate::database::repo::{Store, TagId, TagRef};
use crate::database::schema::SENTINEL_TAG;

pub struct Taxonomy<'s> {
    store: &'s Store,
}

impl<'s> Taxonomy<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn list_dimensions(&self) -> Result<Vec<String>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT parent FROM t_tags
             WHERE parent IS NOT NULL AND parent <> ''
             ORDER BY parent",
        )?;
        let dims = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(dims)
    }

    pub fn list_tags(&self, dimension: &str) -> Result<Vec<String>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT name FROM t_tags
             WHERE parent = ?1 AND name IS NOT NULL AND name <> ''
             ORDER BY name",
        )?;
        let tags = stmt
            .query_map(params![dimension], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    pub fn dimension_exists(&self, dimension: &str) -> Result<bool> {
        let mut stmt = self
            .store
            .conn()
            .prepare("SELECT 1 FROM t_tags WHERE parent = ?1")?;
        Ok(stmt.exists(params![dimension])?)
    }

    /// Looks up a real tag. The empty name never resolves, so the sentinel
    /// row of a dimension cannot be selected or attached by name.
    pub fn tag_id(&self, dimension: &str, name: &str) -> Result<Option<TagId>> {
        if name.is_empty() {
            return Ok(None);
        }
        find_tag(self.store.conn(), dimension, name)
    }

    pub fn tag(&self, tag_id: TagId) -> Result<Option<TagRef>> {
        let tag = self
            .store
            .conn()
            .query_row(
                "SELECT tag_id, parent, name FROM t_tags WHERE tag_id = ?1 AND name <> ''",
                params![tag_id],
                |row| {
                    Ok(TagRef {
                        tag_id: row.get(0)?,
                        dimension: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(tag)
    }

    /// Records an empty dimension. Returns true if a row was inserted.
    pub fn create_dimension(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            debug!("Ignoring empty dimension name");
            return Ok(false);
        }
        let tx = self.store.transaction()?;
        let created = insert_if_absent(&tx, name, SENTINEL_TAG)?;
        tx.commit()?;
        if created {
            info!("Created dimension {:?}", name);
        } else {
            debug!("Dimension {:?} already recorded", name);
        }
        Ok(created)
    }

    /// Creates a tag, implicitly creating its dimension. Returns true if a
    /// row was inserted.
    pub fn create_tag(&self, dimension: &str, name: &str) -> Result<bool> {
        if dimension.is_empty() || name.is_empty() {
            debug!("Ignoring tag with empty dimension or name");
            return Ok(false);
        }
        let tx = self.store.transaction()?;
        let created = insert_if_absent(&tx, dimension, name)?;
        tx.commit()?;
        if created {
            info!("Created tag {:?} in dimension {:?}", name, dimension);
        } else {
            debug!("Tag {:?} already exists in {:?}", name, dimension);
        }
        Ok(created)
    }

    /// Moves every row of `old` to `new`. Rows whose (new, name) key is
    /// already taken are merged into the existing row. Returns the number of
    /// rows that changed dimension or were merged away.
    pub fn rename_dimension(&self, old: &str, new: &str) -> Result<usize> {
        if new.is_empty() || new == old {
            debug!("Ignoring rename of dimension {:?} to {:?}", old, new);
            return Ok(0);
        }
        let tx = self.store.transaction()?;
        let rows = {
            let mut stmt = tx.prepare("SELECT tag_id, name FROM t_tags WHERE parent = ?1")?;
            let mapped = stmt.query_map(params![old], |row| {
                Ok((row.get::<_, TagId>(0)?, row.get::<_, String>(1)?))
            })?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };
        if rows.is_empty() {
            debug!("No dimension {:?} to rename", old);
            return Ok(0);
        }
        for (tag_id, name) in &rows {
            match find_tag(&tx, new, name)? {
                Some(survivor) => {
                    move_edges(&tx, *tag_id, survivor)?;
                    tx.execute("DELETE FROM t_tags WHERE tag_id = ?1", params![tag_id])?;
                }
                None => {
                    tx.execute(
                        "UPDATE t_tags SET parent = ?1 WHERE tag_id = ?2",
                        params![new, tag_id],
                    )?;
                }
            }
        }
        tx.commit()?;
        info!("Renamed dimension {:?} to {:?} ({} rows)", old, new, rows.len());
        Ok(rows.len())
    }

    /// Renames a tag in place so its id, and therefore its associations,
    /// survive. Renaming onto a tag that already exists merges the two.
    /// Returns false if nothing was renamed.
    pub fn rename_tag(&self, dimension: &str, old: &str, new: &str) -> Result<bool> {
        if new.is_empty() || new == old || old.is_empty() {
            debug!("Ignoring rename of tag {:?} to {:?}", old, new);
            return Ok(false);
        }
        let tx = self.store.transaction()?;
        let Some(tag_id) = find_tag(&tx, dimension, old)? else {
            debug!("No tag {:?} in dimension {:?} to rename", old, dimension);
            return Ok(false);
        };
        match find_tag(&tx, dimension, new)? {
            Some(survivor) => {
                move_edges(&tx, tag_id, survivor)?;
                tx.execute("DELETE FROM t_tags WHERE tag_id = ?1", params![tag_id])?;
            }
            None => {
                tx.execute(
                    "UPDATE t_tags SET name = ?1 WHERE tag_id = ?2",
                    params![new, tag_id],
                )?;
            }
        }
        tx.commit()?;
        info!("Renamed tag {:?} to {:?} in dimension {:?}", old, new, dimension);
        Ok(true)
    }

    /// Deletes a dimension with all its tags and their associations.
    /// Returns the number of tag rows removed.
    pub fn delete_dimension(&self, name: &str) -> Result<usize> {
        let tx = self.store.transaction()?;
        let edges = detach_dimension(&tx, name)?;
        let rows = tx.execute("DELETE FROM t_tags WHERE parent = ?1", params![name])?;
        tx.commit()?;
        if rows > 0 {
            info!("Deleted dimension {:?} ({} tags, {} associations)", name, rows, edges);
        }
        Ok(rows)
    }

    /// Deletes one tag and its associations. Returns false if it was absent.
    pub fn delete_tag(&self, dimension: &str, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }
        let tx = self.store.transaction()?;
        let Some(tag_id) = find_tag(&tx, dimension, name)? else {
            return Ok(false);
        };
        let edges = detach_tag(&tx, tag_id)?;
        tx.execute("DELETE FROM t_tags WHERE tag_id = ?1", params![tag_id])?;
        tx.commit()?;
        info!("Deleted tag {:?} from {:?} ({} associations)", name, dimension, edges);
        Ok(true)
    }
}

fn find_tag(conn: &Connection, dimension: &str, name: &str) -> Result<Option<TagId>> {
    let tag_id = conn
        .query_row(
            "SELECT tag_id FROM t_tags WHERE parent = ?1 AND name = ?2 ORDER BY tag_id LIMIT 1",
            params![dimension, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(tag_id)
}

fn insert_if_absent(conn: &Connection, dimension: &str, name: &str) -> Result<bool> {
    if find_tag(conn, dimension, name)?.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO t_tags (parent, name) VALUES (?1, ?2)",
        params![dimension, name],
    )?;
    Ok(true)
}
