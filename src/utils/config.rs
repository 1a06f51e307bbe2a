use std::fs::{self, File};
use std::io::{Write, BufRead, BufReader};
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, anyhow};
use tracing::info;

pub const ROOT_ENV_KEY: &str = "TAGSHELF_ROOT";
pub const DB_FILE_NAME: &str = "images.db";
pub const FILES_DIR_NAME: &str = "files";

/// Where a store lives: the database plus the managed copies of imported
/// images, both under one root so the directory can be moved as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE_NAME)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR_NAME)
    }

    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.files_dir())
            .with_context(|| format!("Failed to create store layout under {:?}", self.root))
    }
}

/// Main entry point to locate the store.
/// Priority: explicit flag, environment variable, `.env`, current directory.
pub fn resolve_store(cli_root: Option<PathBuf>) -> Result<StoreConfig> {
    resolve_store_from(cli_root, std::env::var_os(ROOT_ENV_KEY).map(PathBuf::from), Path::new(".env"))
}

fn resolve_store_from(cli_root: Option<PathBuf>, env_root: Option<PathBuf>, env_file: &Path) -> Result<StoreConfig> {
    if let Some(root) = cli_root {
        return Ok(StoreConfig::new(absolute(root)?));
    }

    if let Some(root) = env_root.filter(|r| !r.as_os_str().is_empty()) {
        info!("Using store root from {}", ROOT_ENV_KEY);
        return Ok(StoreConfig::new(absolute(root)?));
    }

    if env_file.exists() {
        if let Ok(root) = load_from_env(env_file) {
            info!("Loaded store root from {:?}", env_file);
            return Ok(StoreConfig::new(absolute(root)?));
        }
    }

    Ok(StoreConfig::new(std::env::current_dir()?))
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn load_from_env(path: &Path) -> Result<PathBuf> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == ROOT_ENV_KEY && !value.trim().is_empty() {
                return Ok(PathBuf::from(value.trim()));
            }
        }
    }

    Err(anyhow!("No {} entry in {:?}", ROOT_ENV_KEY, path))
}

/// Records `root` in the `.env` file at `path`, keeping unrelated lines.
pub fn save_to_env(path: &Path, root: &Path) -> Result<()> {
    let mut lines = Vec::new();
    if path.exists() {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let ours = line
                .split_once('=')
                .map(|(key, _)| key.trim() == ROOT_ENV_KEY)
                .unwrap_or(false);
            if !ours {
                lines.push(line);
            }
        }
    }

    let mut file = File::create(path).context("Failed to create .env file")?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    writeln!(file, "{}={}", ROOT_ENV_KEY, root.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(&path, "OTHER=1\nTAGSHELF_ROOT=/old/root\n")?;

        save_to_env(&path, Path::new("/srv/images"))?;

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("OTHER=1"));
        assert!(content.contains("TAGSHELF_ROOT=/srv/images"));
        assert!(!content.contains("/old/root"));
        assert_eq!(load_from_env(&path)?, PathBuf::from("/srv/images"));
        Ok(())
    }

    #[test]
    fn test_resolution_priority() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let env_file = dir.path().join(".env");
        let flag = dir.path().join("flag");
        let var = dir.path().join("var");
        let saved = dir.path().join("saved");
        save_to_env(&env_file, &saved)?;

        let picked = resolve_store_from(Some(flag.clone()), Some(var.clone()), &env_file)?;
        assert_eq!(picked.root, flag);
        let picked = resolve_store_from(None, Some(var.clone()), &env_file)?;
        assert_eq!(picked.root, var);
        let picked = resolve_store_from(None, Some(PathBuf::new()), &env_file)?;
        assert_eq!(picked.root, saved);
        let picked = resolve_store_from(None, None, &dir.path().join("missing.env"))?;
        assert_eq!(picked.root, std::env::current_dir()?);
        Ok(())
    }

    #[test]
    fn test_layout_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = StoreConfig::new(dir.path().join("store"));
        config.ensure_layout()?;

        assert_eq!(config.db_path(), dir.path().join("store").join("images.db"));
        assert!(config.files_dir().is_dir());
        Ok(())
    }
}
