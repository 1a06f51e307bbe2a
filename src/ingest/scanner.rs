use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};
use anyhow::Result;
use tracing::warn;

/// Expands the import inputs into the files they name. Directories are
/// walked recursively; hidden entries below them are skipped. Inputs that
/// do not exist are reported back instead of failing the whole import.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut missing = Vec::new();

    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            scan_directory(input, &mut files)?;
        } else {
            warn!("Import input {:?} does not exist", input);
            missing.push(input.clone());
        }
    }
    Ok((files, missing))
}

fn scan_directory(root: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let walker = WalkDir::new(root).sort_by_file_name().into_iter();

    for entry in walker.filter_entry(descend_into) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(())
}

/// The input itself is always walked, even when its own name is dotted.
fn descend_into(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !is_dotfile(entry.file_name())
}

fn is_dotfile(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
