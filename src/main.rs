use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use tagshelf::archive::zip_export;
use tagshelf::database::associations::Associations;
use tagshelf::database::repo::{FileId, FileRecord, Store, TagRef};
use tagshelf::database::taxonomy::Taxonomy;
use tagshelf::ingest::importer::Importer;
use tagshelf::paths::resolver::PathResolver;
use tagshelf::search::engine::{QueryEngine, SearchHit, SearchMode, SearchOutcome, Selection};
use tagshelf::utils::config::{self, StoreConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Organize images under dimensions and tags", long_about = None)]
struct Args {
    /// Store root holding images.db and files/
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store layout
    Init {
        /// Remember the root in ./.env
        #[arg(long)]
        save: bool,
    },
    /// List dimensions
    Dims,
    /// Manage dimensions
    Dim {
        #[command(subcommand)]
        action: DimAction,
    },
    /// List the tags of a dimension
    Tags { dimension: String },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Copy images into the store and tag them
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Tag as Dimension=Tag, repeatable
        #[arg(short, long = "tag", value_parser = parse_tag_arg)]
        tags: Vec<TagArg>,
        /// Create tags that do not exist yet
        #[arg(long)]
        create_tags: bool,
    },
    /// Find images by tags
    Search {
        #[arg(short, long = "tag", value_parser = parse_tag_arg)]
        tags: Vec<TagArg>,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Any)]
        mode: ModeArg,
    },
    /// Search and pack the results into a ZIP archive
    Export {
        #[arg(short, long = "tag", value_parser = parse_tag_arg)]
        tags: Vec<TagArg>,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Any)]
        mode: ModeArg,
        /// File ids to leave out of the archive
        #[arg(long)]
        exclude: Vec<FileId>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show one file record and its tags
    Show { file_id: FileId },
    /// Delete a file record and its tag associations
    Forget {
        file_id: FileId,
        /// Also delete the managed copy on disk
        #[arg(long)]
        purge: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DimAction {
    Add { name: String },
    Rename { old: String, new: String },
    Rm { name: String },
}

#[derive(Subcommand, Debug)]
enum TagAction {
    Add { dimension: String, name: String },
    Rename { dimension: String, old: String, new: String },
    Rm { dimension: String, name: String },
}

/// Values accepted by `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Files carrying every selected tag
    All,
    /// Files carrying at least one selected tag
    Any,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => SearchMode::All,
            ModeArg::Any => SearchMode::Any,
        }
    }
}

#[derive(Debug, Clone)]
struct TagArg {
    dimension: String,
    name: String,
}

fn parse_tag_arg(s: &str) -> std::result::Result<TagArg, String> {
    match s.split_once('=') {
        Some((dimension, name)) if !dimension.is_empty() && !name.is_empty() => Ok(TagArg {
            dimension: dimension.to_string(),
            name: name.to_string(),
        }),
        _ => Err(format!("expected Dimension=Tag, got {:?}", s)),
    }
}

/// Names are trimmed when written and never when looked up.
fn normalize_name(name: &str) -> &str {
    name.trim()
}

fn selection_of(tags: &[TagArg]) -> Selection {
    let mut selected = Selection::new();
    for tag in tags {
        selected
            .entry(tag.dimension.clone())
            .or_default()
            .insert(tag.name.clone());
    }
    selected
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();

    let config = config::resolve_store(args.root.clone())?;
    config.ensure_layout()?;

    if let Command::Init { save } = args.command {
        if save {
            config::save_to_env(std::path::Path::new(".env"), &config.root)?;
        }
        info!("Store ready at {:?}", config.root);
        println!("{}", config.root.display());
        return Ok(());
    }

    let store = Store::open(&config.db_path())
        .with_context(|| format!("Failed to open store at {:?}", config.db_path()))?;
    let outcome = run(&args, &config, &store);
    store.close()?;
    outcome
}

fn run(args: &Args, config: &StoreConfig, store: &Store) -> Result<()> {
    let taxonomy = Taxonomy::new(store);
    let resolver = PathResolver::new(&config.root);

    match &args.command {
        Command::Init { .. } => Ok(()),
        Command::Dims => print_list(args.json, &taxonomy.list_dimensions()?),
        Command::Tags { dimension } => print_list(args.json, &taxonomy.list_tags(dimension)?),
        Command::Dim { action } => {
            match action {
                DimAction::Add { name } => {
                    taxonomy.create_dimension(normalize_name(name))?;
                }
                DimAction::Rename { old, new } => {
                    taxonomy.rename_dimension(old, normalize_name(new))?;
                }
                DimAction::Rm { name } => {
                    taxonomy.delete_dimension(name)?;
                }
            }
            print_list(args.json, &taxonomy.list_dimensions()?)
        }
        Command::Tag { action } => {
            let dimension = match action {
                TagAction::Add { dimension, name } => {
                    let dimension = normalize_name(dimension);
                    taxonomy.create_tag(dimension, normalize_name(name))?;
                    dimension
                }
                TagAction::Rename { dimension, old, new } => {
                    taxonomy.rename_tag(dimension, old, normalize_name(new))?;
                    dimension.as_str()
                }
                TagAction::Rm { dimension, name } => {
                    taxonomy.delete_tag(dimension, name)?;
                    dimension.as_str()
                }
            };
            print_list(args.json, &taxonomy.list_tags(dimension)?)
        }
        Command::Import { paths, tags, create_tags } => {
            let pairs: Vec<(String, String)> = tags
                .iter()
                .map(|t| {
                    if *create_tags {
                        (normalize_name(&t.dimension).to_string(), normalize_name(&t.name).to_string())
                    } else {
                        (t.dimension.clone(), t.name.clone())
                    }
                })
                .collect();
            let importer = Importer::new(store, &resolver, config.files_dir()).with_progress(!args.json);
            let report = importer.import(paths, &pairs, *create_tags)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("imported {} files", report.imported.len());
                for skipped in &report.skipped {
                    println!("skipped {}", skipped.display());
                }
                for failed in &report.failed {
                    println!("failed {}", failed.display());
                }
            }
            Ok(())
        }
        Command::Search { tags, mode } => {
            let engine = QueryEngine::new(store, &resolver);
            match engine.search(&selection_of(tags), (*mode).into())? {
                SearchOutcome::NothingSelected => bail!("Select at least one tag with --tag Dimension=Tag"),
                SearchOutcome::NoKnownTags => {
                    warn!("None of the selected tags exist any more");
                    print_hits(args.json, &[])
                }
                SearchOutcome::Matches(hits) => print_hits(args.json, &hits),
            }
        }
        Command::Export { tags, mode, exclude, output } => {
            let engine = QueryEngine::new(store, &resolver);
            let hits = match engine.search(&selection_of(tags), (*mode).into())? {
                SearchOutcome::NothingSelected => bail!("Select at least one tag with --tag Dimension=Tag"),
                SearchOutcome::NoKnownTags => Vec::new(),
                SearchOutcome::Matches(hits) => hits,
            };
            let chosen: Vec<PathBuf> = hits
                .into_iter()
                .filter(|h| !exclude.contains(&h.file_id))
                .map(|h| h.path)
                .collect();
            if chosen.is_empty() {
                bail!("Nothing to export");
            }
            let report = zip_export::create_zip(&chosen, output)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("wrote {} files to {}", report.written, output.display());
            }
            Ok(())
        }
        Command::Show { file_id } => {
            let assoc = Associations::new(store);
            let Some(record) = assoc.file(*file_id)? else {
                bail!("No file with id {}", file_id);
            };
            let tags = assoc.tags_of(*file_id)?;
            if args.json {
                #[derive(Serialize)]
                struct Shown<'r> {
                    #[serde(flatten)]
                    record: &'r FileRecord,
                    resolved: Option<PathBuf>,
                    tags: &'r [TagRef],
                }
                let shown = Shown {
                    record: &record,
                    resolved: resolver.resolve_for_open(&record.file_path),
                    tags: &tags,
                };
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("{}\t{}\t{}", record.file_id, record.file_name, record.file_path);
                for tag in tags {
                    println!("  {}={}", tag.dimension, tag.name);
                }
            }
            Ok(())
        }
        Command::Forget { file_id, purge } => {
            let assoc = Associations::new(store);
            let Some(record) = assoc.file(*file_id)? else {
                bail!("No file with id {}", file_id);
            };
            assoc.delete_file(*file_id)?;
            if *purge {
                if let Some(path) = resolver.resolve_for_open(&record.file_path) {
                    if path.starts_with(config.files_dir()) {
                        std::fs::remove_file(&path)
                            .with_context(|| format!("Failed to remove {:?}", path))?;
                    } else {
                        warn!("Not purging {:?}: outside the managed file area", path);
                    }
                }
            }
            Ok(())
        }
    }
}

fn print_list(json: bool, items: &[String]) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", item);
        }
    }
    Ok(())
}

fn print_hits(json: bool, hits: &[SearchHit]) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
    } else if hits.is_empty() {
        println!("no matching files");
    } else {
        for hit in hits {
            println!("{}\t{}", hit.file_id, hit.path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_arg() {
        let tag = parse_tag_arg("Scene=Indoor").unwrap();
        assert_eq!((tag.dimension.as_str(), tag.name.as_str()), ("Scene", "Indoor"));
        let tag = parse_tag_arg("Note=a=b").unwrap();
        assert_eq!(tag.name, "a=b");
        assert!(parse_tag_arg("Scene").is_err());
        assert!(parse_tag_arg("=Indoor").is_err());
        assert!(parse_tag_arg("Scene=").is_err());
    }

    #[test]
    fn test_selection_groups_by_dimension() {
        let tags = vec![
            parse_tag_arg("Scene=Indoor").unwrap(),
            parse_tag_arg("Scene=Outdoor").unwrap(),
            parse_tag_arg("Material=Tile").unwrap(),
        ];
        let selected = selection_of(&tags);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected["Scene"].len(), 2);
    }

    #[test]
    fn test_cli_parses_search() {
        let args = Args::try_parse_from(["tagshelf", "search", "-t", "Scene=Indoor", "--mode", "all"]).unwrap();
        match args.command {
            Command::Search { tags, mode } => {
                assert_eq!(tags.len(), 1);
                assert_eq!(mode, ModeArg::All);
                assert_eq!(SearchMode::from(mode), SearchMode::All);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_mode_defaults_to_any() {
        let args = Args::try_parse_from(["tagshelf", "export", "-t", "Scene=Indoor", "-o", "out.zip"]).unwrap();
        match args.command {
            Command::Export { mode, .. } => assert_eq!(SearchMode::from(mode), SearchMode::Any),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_normalize_trims_on_write() {
        assert_eq!(normalize_name("  Scene \t"), "Scene");
    }
}
