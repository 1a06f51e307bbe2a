use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Default, Serialize)]
pub struct ExportReport {
    pub written: usize,
    pub missing: Vec<PathBuf>,
}

/// Packs `paths` into a ZIP at `output`, each entry named after the file's
/// base name. Paths that vanished since the search are skipped.
pub fn create_zip(paths: &[PathBuf], output: &Path) -> Result<ExportReport> {
    let file = File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut report = ExportReport::default();
    let mut used = HashSet::new();
    for path in paths {
        let mut source = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Skipping {:?}: no longer on disk", path);
                report.missing.push(path.clone());
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to open {:?}", path)),
        };

        let entry = unique_entry_name(path, &mut used);
        zip.start_file(entry, options)?;
        io::copy(&mut source, &mut zip).with_context(|| format!("Failed to archive {:?}", path))?;
        report.written += 1;
    }

    zip.finish().context("Failed to finalize archive")?;
    info!("Wrote {} files to {:?}", report.written, output);
    Ok(report)
}

fn unique_entry_name(path: &Path, used: &mut HashSet<String>) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    if used.insert(base.clone()) {
        return base;
    }

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (base.clone(), String::new()),
    };
    let mut n = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
