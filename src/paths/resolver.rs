use std::path::{Component, Path, PathBuf};

/// Translates between persisted file paths and openable ones.
///
/// Fresh imports are persisted relative to the store root so the whole
/// store directory can be moved. Records written before that convention
/// hold absolute paths; both forms resolve without a migration.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `None` for the empty path; absolute paths are returned unchanged.
    pub fn resolve_for_open(&self, persisted: &str) -> Option<PathBuf> {
        if persisted.is_empty() {
            return None;
        }
        let path = Path::new(persisted);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        Some(self.root.join(path))
    }

    /// Convenience for [`persist_for_storage`] against this resolver's root.
    pub fn persist(&self, absolute: &Path) -> String {
        persist_for_storage(absolute, &self.root)
    }
}

/// Computes the form of `absolute` stored in the database. Paths under
/// `store_root` become root-relative with `/` separators; anything else is
/// kept absolute. Only called at import time.
pub fn persist_for_storage(absolute: &Path, store_root: &Path) -> String {
    match absolute.strip_prefix(store_root) {
        Ok(relative) if relative.components().all(|c| matches!(c, Component::Normal(_))) => {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if parts.is_empty() {
                absolute.to_string_lossy().into_owned()
            } else {
                parts.join("/")
            }
        }
        _ => absolute.to_string_lossy().into_owned(),
    }
}
