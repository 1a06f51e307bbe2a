use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rusqlite::params_from_iter;
use serde::Serialize;
use tracing::debug;

use crate::database::error::Result;
use crate::database::repo::{FileId, Store, TagId};
use crate::database::taxonomy::Taxonomy;
use crate::paths::resolver::PathResolver;

/// Selected tag names keyed by dimension.
pub type Selection = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Files carrying every selected tag, across all dimensions.
    All,
    /// Files carrying at least one selected tag.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub file_id: FileId,
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The selection named no tags; nothing was queried.
    NothingSelected,
    /// Every selected tag has since been deleted or renamed.
    NoKnownTags,
    /// The query ran. Empty when nothing matched or no match exists on disk.
    Matches(Vec<SearchHit>),
}

pub struct QueryEngine<'a> {
    store: &'a Store,
    resolver: &'a PathResolver,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a Store, resolver: &'a PathResolver) -> Self {
        Self { store, resolver }
    }

    pub fn search(&self, selected: &Selection, mode: SearchMode) -> Result<SearchOutcome> {
        if selected.values().all(|tags| tags.is_empty()) {
            return Ok(SearchOutcome::NothingSelected);
        }

        let tag_ids = self.resolve_selection(selected)?;
        if tag_ids.is_empty() {
            return Ok(SearchOutcome::NoKnownTags);
        }

        let placeholders = vec!["?"; tag_ids.len()].join(",");
        let sql = match mode {
            SearchMode::Any => format!(
                "SELECT DISTINCT f.file_id, f.file_name, f.file_path
                 FROM t_files f
                 JOIN t_files_tags ft ON f.file_id = ft.file_id
                 WHERE ft.tag_id IN ({})
                 ORDER BY f.file_id",
                placeholders
            ),
            SearchMode::All => format!(
                "SELECT f.file_id, f.file_name, f.file_path
                 FROM t_files f
                 JOIN t_files_tags ft ON f.file_id = ft.file_id
                 WHERE ft.tag_id IN ({})
                 GROUP BY f.file_id
                 HAVING COUNT(DISTINCT ft.tag_id) = {}
                 ORDER BY f.file_id",
                placeholders,
                tag_ids.len()
            ),
        };

        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(tag_ids.iter()), |row| {
                Ok((
                    row.get::<_, FileId>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let hits = rows
            .into_iter()
            .filter_map(|(file_id, file_name, file_path)| {
                let persisted = file_path.unwrap_or_default();
                let Some(path) = self.resolver.resolve_for_open(&persisted) else {
                    debug!("File {} has no stored path", file_id);
                    return None;
                };
                if !path.exists() {
                    debug!("File {} is missing on disk at {:?}", file_id, path);
                    return None;
                }
                Some(SearchHit {
                    file_id,
                    file_name: file_name.unwrap_or_default(),
                    path,
                })
            })
            .collect();
        Ok(SearchOutcome::Matches(hits))
    }

    /// Stale pairs, whose tag no longer exists, are dropped.
    fn resolve_selection(&self, selected: &Selection) -> Result<BTreeSet<TagId>> {
        let taxonomy = Taxonomy::new(self.store);
        let mut ids = BTreeSet::new();
        for (dimension, tags) in selected {
            for tag in tags {
                match taxonomy.tag_id(dimension, tag)? {
                    Some(id) => {
                        ids.insert(id);
                    }
                    None => debug!("Dropping stale selection {}={}", dimension, tag),
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::associations::Associations;
    use anyhow::Result;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        store: Store,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let dir = tempfile::tempdir()?;
            fs::create_dir_all(dir.path().join("files"))?;
            let store = Store::open(&dir.path().join("images.db"))?;
            Ok(Self { store, dir })
        }

        fn resolver(&self) -> PathResolver {
            PathResolver::new(self.dir.path())
        }

        fn tag(&self, dimension: &str, name: &str) -> Result<TagId> {
            let tax = Taxonomy::new(&self.store);
            tax.create_tag(dimension, name)?;
            Ok(tax.tag_id(dimension, name)?.unwrap())
        }

        fn import(&self, name: &str, tags: &[TagId]) -> Result<FileId> {
            let relative = format!("files/{}", name);
            fs::write(self.dir.path().join(&relative), name.as_bytes())?;
            let tag_ids: BTreeSet<TagId> = tags.iter().copied().collect();
            Ok(Associations::new(&self.store).register_tagged(name, &relative, &tag_ids)?)
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }
    }

    fn selection(pairs: &[(&str, &str)]) -> Selection {
        let mut selected = Selection::new();
        for (dimension, tag) in pairs {
            selected
                .entry(dimension.to_string())
                .or_default()
                .insert(tag.to_string());
        }
        selected
    }

    fn ids(outcome: SearchOutcome) -> Vec<FileId> {
        match outcome {
            SearchOutcome::Matches(hits) => hits.into_iter().map(|h| h.file_id).collect(),
            other => panic!("expected matches, got {:?}", other),
        }
    }

    #[test]
    fn test_all_and_any_across_dimensions() -> Result<()> {
        let fx = Fixture::new()?;
        let a1 = fx.tag("dimA", "A1")?;
        let b1 = fx.tag("dimB", "B1")?;
        let f1 = fx.import("f1.jpg", &[a1])?;
        let f2 = fx.import("f2.jpg", &[a1, b1])?;
        let f3 = fx.import("f3.jpg", &[b1])?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);
        let selected = selection(&[("dimA", "A1"), ("dimB", "B1")]);

        assert_eq!(ids(engine.search(&selected, SearchMode::Any)?), vec![f1, f2, f3]);
        assert_eq!(ids(engine.search(&selected, SearchMode::All)?), vec![f2]);
        Ok(())
    }

    #[test]
    fn test_scene_scenario() -> Result<()> {
        let fx = Fixture::new()?;
        let indoor = fx.tag("Scene", "Indoor")?;
        let outdoor = fx.tag("Scene", "Outdoor")?;
        let tile = fx.tag("Material", "Tile")?;
        let photo1 = fx.import("photo1.jpg", &[indoor])?;
        let photo2 = fx.import("photo2.jpg", &[outdoor, tile])?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);
        let selected = selection(&[("Scene", "Indoor"), ("Scene", "Outdoor")]);

        assert_eq!(ids(engine.search(&selected, SearchMode::Any)?), vec![photo1, photo2]);
        assert!(ids(engine.search(&selected, SearchMode::All)?).is_empty());
        Ok(())
    }

    #[test]
    fn test_hits_resolve_to_absolute_paths() -> Result<()> {
        let fx = Fixture::new()?;
        let indoor = fx.tag("Scene", "Indoor")?;
        fx.import("photo1.jpg", &[indoor])?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        let SearchOutcome::Matches(hits) =
            engine.search(&selection(&[("Scene", "Indoor")]), SearchMode::Any)?
        else {
            panic!("expected matches");
        };
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "photo1.jpg");
        assert_eq!(hits[0].path, fx.root().join("files/photo1.jpg"));
        assert!(hits[0].path.is_absolute());
        Ok(())
    }

    #[test]
    fn test_missing_files_are_filtered() -> Result<()> {
        let fx = Fixture::new()?;
        let indoor = fx.tag("Scene", "Indoor")?;
        let gone = fx.import("gone.jpg", &[indoor])?;
        let kept = fx.import("kept.jpg", &[indoor])?;
        fs::remove_file(fx.root().join("files/gone.jpg"))?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        let found = ids(engine.search(&selection(&[("Scene", "Indoor")]), SearchMode::Any)?);
        assert_eq!(found, vec![kept]);
        assert!(!found.contains(&gone));
        Ok(())
    }

    #[test]
    fn test_nothing_selected_is_reported_before_querying() -> Result<()> {
        let fx = Fixture::new()?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        assert_eq!(engine.search(&Selection::new(), SearchMode::Any)?, SearchOutcome::NothingSelected);
        let mut empty_dim = Selection::new();
        empty_dim.insert("Scene".to_string(), BTreeSet::new());
        assert_eq!(engine.search(&empty_dim, SearchMode::All)?, SearchOutcome::NothingSelected);
        Ok(())
    }

    #[test]
    fn test_stale_selection() -> Result<()> {
        let fx = Fixture::new()?;
        let indoor = fx.tag("Scene", "Indoor")?;
        let file = fx.import("photo1.jpg", &[indoor])?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        let only_stale = selection(&[("Scene", "Deleted")]);
        assert_eq!(engine.search(&only_stale, SearchMode::Any)?, SearchOutcome::NoKnownTags);

        // A stale pair does not make ALL mode unsatisfiable.
        let mixed = selection(&[("Scene", "Indoor"), ("Scene", "Deleted")]);
        assert_eq!(ids(engine.search(&mixed, SearchMode::All)?), vec![file]);
        Ok(())
    }

    #[test]
    fn test_no_matches_is_not_an_empty_selection() -> Result<()> {
        let fx = Fixture::new()?;
        fx.tag("Scene", "Indoor")?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        assert_eq!(
            engine.search(&selection(&[("Scene", "Indoor")]), SearchMode::Any)?,
            SearchOutcome::Matches(Vec::new())
        );
        Ok(())
    }

    #[test]
    fn test_legacy_absolute_paths_are_found() -> Result<()> {
        let fx = Fixture::new()?;
        let indoor = fx.tag("Scene", "Indoor")?;
        let outside = tempfile::tempdir()?;
        let legacy = outside.path().join("legacy.jpg");
        fs::write(&legacy, b"jpeg")?;
        let file = Associations::new(&fx.store).register_tagged(
            "legacy.jpg",
            &legacy.to_string_lossy(),
            &BTreeSet::from([indoor]),
        )?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        let SearchOutcome::Matches(hits) =
            engine.search(&selection(&[("Scene", "Indoor")]), SearchMode::Any)?
        else {
            panic!("expected matches");
        };
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, file);
        assert_eq!(hits[0].path, legacy);
        Ok(())
    }

    #[test]
    fn test_deleted_tag_drops_out_of_results() -> Result<()> {
        let fx = Fixture::new()?;
        let indoor = fx.tag("Scene", "Indoor")?;
        let tile = fx.tag("Material", "Tile")?;
        let file = fx.import("photo1.jpg", &[indoor, tile])?;
        let resolver = fx.resolver();
        let engine = QueryEngine::new(&fx.store, &resolver);

        Taxonomy::new(&fx.store).delete_dimension("Scene")?;

        let selected = selection(&[("Scene", "Indoor"), ("Material", "Tile")]);
        assert_eq!(ids(engine.search(&selected, SearchMode::All)?), vec![file]);
        assert_eq!(
            engine.search(&selection(&[("Scene", "Indoor")]), SearchMode::Any)?,
            SearchOutcome::NoKnownTags
        );
        Ok(())
    }
}
