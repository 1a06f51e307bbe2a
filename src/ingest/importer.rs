use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::database::associations::Associations;
use crate::database::repo::{FileId, Store, TagId};
use crate::database::taxonomy::Taxonomy;
use crate::ingest::{hasher, scanner};
use crate::media::mimetype;
use crate::paths::resolver::PathResolver;

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<FileId>,
    pub skipped: Vec<PathBuf>,
    /// Images that were candidates but could not be copied or registered.
    pub failed: Vec<PathBuf>,
    pub unknown_tags: Vec<(String, String)>,
}

/// Copies images into the managed file area and registers them with the
/// same tag set.
pub struct Importer<'a> {
    store: &'a Store,
    resolver: &'a PathResolver,
    files_dir: PathBuf,
    show_progress: bool,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a Store, resolver: &'a PathResolver, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            resolver,
            files_dir: files_dir.into(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn import(
        &self,
        inputs: &[PathBuf],
        tags: &[(String, String)],
        create_missing: bool,
    ) -> Result<ImportReport> {
        if tags.is_empty() {
            bail!("Select at least one Dimension=Tag to attach to the imported files");
        }
        let mut report = ImportReport::default();
        let tag_ids = self.resolve_tags(tags, create_missing, &mut report)?;
        if tag_ids.is_empty() {
            bail!("None of the requested tags exist; nothing was imported");
        }

        let (files, missing) = scanner::collect_inputs(inputs)?;
        report.skipped.extend(missing);
        fs::create_dir_all(&self.files_dir)
            .with_context(|| format!("Failed to create {:?}", self.files_dir))?;

        let pb = if self.show_progress {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let assoc = Associations::new(self.store);
        for source in files {
            pb.set_message(source.display().to_string());
            match mimetype::is_image(&source) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Skipping {:?}: not an image", source);
                    report.skipped.push(source);
                    pb.inc(1);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {:?}: {:#}", source, e);
                    report.skipped.push(source);
                    pb.inc(1);
                    continue;
                }
            }

            match self.import_one(&assoc, &source, &tag_ids) {
                Ok(file_id) => report.imported.push(file_id),
                Err(e) => {
                    error!("{:#}", e);
                    report.failed.push(source);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "Imported {} files, skipped {}, failed {}",
            report.imported.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn resolve_tags(
        &self,
        tags: &[(String, String)],
        create_missing: bool,
        report: &mut ImportReport,
    ) -> Result<BTreeSet<TagId>> {
        let taxonomy = Taxonomy::new(self.store);
        let mut ids = BTreeSet::new();
        for (dimension, name) in tags {
            if create_missing {
                taxonomy.create_tag(dimension, name)?;
            }
            match taxonomy.tag_id(dimension, name)? {
                Some(id) => {
                    ids.insert(id);
                }
                None => {
                    warn!("Tag {}={} does not exist, not attaching it", dimension, name);
                    report.unknown_tags.push((dimension.clone(), name.clone()));
                }
            }
        }
        Ok(ids)
    }

    fn import_one(&self, assoc: &Associations<'_>, source: &Path, tag_ids: &BTreeSet<TagId>) -> Result<FileId> {
        let display_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string_lossy().into_owned());
        let mut dest = self.files_dir.join(managed_name(&display_name));
        while dest.exists() {
            dest = self.files_dir.join(managed_name(&display_name));
        }

        fs::copy(source, &dest).with_context(|| format!("Failed to copy {:?} to {:?}", source, dest))?;
        let registered = hasher::verify_copy(source, &dest).and_then(|digest| {
            debug!("Copied {:?} -> {:?} (sha256 {})", source, dest, digest);
            let persisted = self.resolver.persist(&dest);
            Ok(assoc.register_tagged(&display_name, &persisted, tag_ids)?)
        });

        match registered {
            Ok(file_id) => Ok(file_id),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&dest) {
                    warn!("Failed to remove {:?} after failed import: {}", dest, cleanup);
                }
                Err(e.context(format!("Failed to import {:?}", source)))
            }
        }
    }
}

/// `<seconds>.<micros>_<name>`, unique per import of the same name.
fn managed_name(display_name: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}_{}", now.as_secs(), now.subsec_micros(), display_name)
}
