//! Command-line front end over [`Explorer`].

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::catalog::{AddReport, FileReference, ProjectId, ReferenceId};
use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, Result};
use crate::launch;
use crate::persist;
use crate::query::SearchQuery;
use crate::session::Explorer;
use crate::tags::TagId;
use crate::verify::CancelToken;

#[derive(Parser)]
#[command(name = "explorer")]
#[command(about = "Organise files into project views, wherever the files actually are", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Catalog store to use (overrides EXPLORER_STORE)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Take over a store lock held by another process
    #[arg(long, global = true)]
    force_unlock: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log only warnings and errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List projects
    Projects,

    /// Create, rename, delete, reorder, export or import a project
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },

    /// List a project's files in display order
    List { project: u64 },

    /// Add files (directories are expanded) to a project
    Add(AddArgs),

    /// Remove a file reference from its project (the file itself is untouched)
    Remove { reference: u64 },

    /// Point a reference at the file's new location
    Relocate { reference: u64, path: PathBuf },

    /// Change a reference's display name (empty restores the file name)
    Rename { reference: u64, name: String },

    /// List tags
    Tags,

    /// Manage tags and tag assignments
    Tag {
        #[command(subcommand)]
        action: TagCommand,
    },

    /// Filter by project, name and tags
    Search(SearchArgs),

    /// Free-text search over names and tags
    Find {
        #[arg(long)]
        project: Option<u64>,
        text: String,
    },

    /// Refresh present/missing status
    Verify { project: Option<u64> },

    /// Open a file with its default application
    Open { reference: u64 },

    /// Open the folder containing a file
    Reveal { reference: u64 },
}

#[derive(Subcommand)]
enum ProjectCommand {
    Create { name: String },
    Rename { id: u64, name: String },
    Delete { id: u64 },
    /// New display order: every reference id of the project exactly once
    Reorder {
        id: u64,
        #[arg(required = true, num_args = 1..)]
        order: Vec<u64>,
    },
    Export { id: u64, output: PathBuf },
    Import { input: PathBuf },
}

#[derive(Subcommand)]
enum TagCommand {
    Create {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Rename { tag: String, name: String },
    /// Set a tag's color, or clear it when no color is given
    Color { tag: String, color: Option<String> },
    Delete { tag: String },
    /// Replace a reference's tags from a comma-separated list
    Set { reference: u64, tags: String },
    Add { reference: u64, tag: String },
    Rm { reference: u64, tag: String },
}

#[derive(Args)]
pub(crate) struct AddArgs {
    project: u64,

    #[arg(required = true, num_args = 1..)]
    paths: Vec<PathBuf>,

    /// Display name (single file only)
    #[arg(long)]
    name: Option<String>,

    /// Only take the top level of dropped directories
    #[arg(long)]
    no_recurse: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    project: Option<u64>,

    /// Case-insensitive part of the display name
    #[arg(long)]
    name: Option<String>,

    /// Tag name or id (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Match any of the tags instead of all of them
    #[arg(long)]
    any: bool,
}

pub fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

pub fn execute(cli: Cli) -> Result<()> {
    let mut config = match &cli.store {
        Some(store) => ExplorerConfig::for_store(store)?,
        None => ExplorerConfig::load()?,
    };
    // One-shot process: verification only when asked for.
    config.verify_on_load = false;
    config.verify_on_open = false;

    let explorer = Explorer::open_with(config, cli.force_unlock)?;
    let result = dispatch(&explorer, cli.command);
    let shutdown = explorer.shutdown();
    result.and(shutdown)
}

fn dispatch(explorer: &Explorer, command: Commands) -> Result<()> {
    match command {
        Commands::Projects => {
            for project in explorer.list_projects() {
                println!("{}\t{}\t{} files", project.id, project.name, project.references.len());
            }
        }
        Commands::Project { action } => project_command(explorer, action)?,
        Commands::List { project } => {
            for reference in explorer.open_project(ProjectId(project))? {
                print_reference(explorer, &reference);
            }
        }
        Commands::Add(args) => add_command(explorer, args)?,
        Commands::Remove { reference } => {
            let removed = explorer.remove(ReferenceId(reference))?;
            println!("removed {} ({})", removed.id, removed.display_name);
        }
        Commands::Relocate { reference, path } => {
            explorer.relocate(ReferenceId(reference), &path)?;
            let status = explorer.verify(ReferenceId(reference))?;
            println!("relocated {} ({})", reference, status.as_str());
        }
        Commands::Rename { reference, name } => {
            explorer.rename_reference(ReferenceId(reference), &name)?;
        }
        Commands::Tags => {
            for tag in explorer.list_tags() {
                match &tag.color {
                    Some(color) => println!("{}\t{}\t{}", tag.id, tag.name, color),
                    None => println!("{}\t{}", tag.id, tag.name),
                }
            }
        }
        Commands::Tag { action } => tag_command(explorer, action)?,
        Commands::Search(args) => {
            let mut tags = Vec::with_capacity(args.tags.len());
            for tag in &args.tags {
                tags.push(resolve_tag(explorer, tag)?);
            }
            let query = SearchQuery {
                project: args.project.map(ProjectId),
                name: args.name,
                ..SearchQuery::default()
            }
            .with_tags(tags, !args.any);
            for reference in explorer.search(&query)? {
                print_reference(explorer, &reference);
            }
        }
        Commands::Find { project, text } => {
            for reference in explorer.quick_search(project.map(ProjectId), &text)? {
                print_reference(explorer, &reference);
            }
        }
        Commands::Verify { project } => {
            let report = explorer.verify_all(project.map(ProjectId), &CancelToken::new())?;
            println!(
                "{} checked: {} present, {} missing, {} permission denied",
                report.checked, report.present, report.missing, report.denied
            );
        }
        Commands::Open { reference } => launch::open(&explorer.get(ReferenceId(reference))?)?,
        Commands::Reveal { reference } => launch::reveal(&explorer.get(ReferenceId(reference))?)?,
    }
    Ok(())
}

fn project_command(explorer: &Explorer, action: ProjectCommand) -> Result<()> {
    match action {
        ProjectCommand::Create { name } => {
            let id = explorer.create_project(&name)?;
            println!("{}", id);
        }
        ProjectCommand::Rename { id, name } => explorer.rename_project(ProjectId(id), &name)?,
        ProjectCommand::Delete { id } => {
            let project = explorer.delete_project(ProjectId(id))?;
            println!("deleted {} ({} references)", project.name, project.references.len());
        }
        ProjectCommand::Reorder { id, order } => {
            let order: Vec<ReferenceId> = order.into_iter().map(ReferenceId).collect();
            explorer.reorder(ProjectId(id), &order)?;
        }
        ProjectCommand::Export { id, output } => {
            let document = explorer.export_project(ProjectId(id))?;
            persist::write_document(&output, &document)?;
            println!("exported {} references to {}", document.references.len(), output.display());
        }
        ProjectCommand::Import { input } => {
            let document = persist::read_document(&input)?;
            let id = explorer.import_project(document)?;
            println!("{}", id);
        }
    }
    Ok(())
}

/// The single file `--name` applies to. Rejected when it would be silently dropped.
pub(crate) fn named_target(args: &AddArgs) -> Result<Option<(&Path, &str)>> {
    let Some(name) = args.name.as_deref() else {
        return Ok(None);
    };
    match args.paths.as_slice() {
        [single] if !single.is_dir() => Ok(Some((single.as_path(), name))),
        [single] => Err(ExplorerError::path_invalid(
            single,
            "--name applies to a single file, not a directory",
        )),
        many => Err(ExplorerError::path_invalid(
            many.get(1).cloned().unwrap_or_default(),
            "--name applies to a single file",
        )),
    }
}

fn add_command(explorer: &Explorer, args: AddArgs) -> Result<()> {
    let project = ProjectId(args.project);

    if let Some((path, name)) = named_target(&args)? {
        let id = explorer.add(project, path, Some(name))?;
        println!("{}", id);
        return Ok(());
    }

    let (dirs, files): (Vec<PathBuf>, Vec<PathBuf>) = args.paths.into_iter().partition(|p| p.is_dir());
    let mut report = explorer.add_many(project, &files)?;
    for dir in dirs {
        let expanded = explorer.add_directory(project, &dir, !args.no_recurse)?;
        merge(&mut report, expanded);
    }

    for id in &report.added {
        println!("{}", id);
    }
    for (path, reason) in &report.rejected {
        eprintln!("skipped {}: {}", path.display(), reason);
    }
    Ok(())
}

fn merge(into: &mut AddReport, other: AddReport) {
    into.added.extend(other.added);
    into.rejected.extend(other.rejected);
}

fn tag_command(explorer: &Explorer, action: TagCommand) -> Result<()> {
    match action {
        TagCommand::Create { name, color } => {
            let id = explorer.create_tag(&name, color)?;
            println!("{}", id);
        }
        TagCommand::Rename { tag, name } => {
            let id = resolve_tag(explorer, &tag)?;
            explorer.rename_tag(id, &name)?;
        }
        TagCommand::Color { tag, color } => {
            let id = resolve_tag(explorer, &tag)?;
            explorer.set_tag_color(id, color)?;
        }
        TagCommand::Delete { tag } => {
            let id = resolve_tag(explorer, &tag)?;
            explorer.delete_tag(id)?;
        }
        TagCommand::Set { reference, tags } => {
            explorer.set_tags_from_text(ReferenceId(reference), &tags)?;
        }
        TagCommand::Add { reference, tag } => {
            let id = resolve_tag(explorer, &tag)?;
            explorer.tag(ReferenceId(reference), id)?;
        }
        TagCommand::Rm { reference, tag } => {
            let id = resolve_tag(explorer, &tag)?;
            explorer.untag(ReferenceId(reference), id)?;
        }
    }
    Ok(())
}

/// Tag names win over numeric ids, so a tag literally named "2024" stays reachable.
fn resolve_tag(explorer: &Explorer, raw: &str) -> Result<TagId> {
    explorer.read(|c| {
        if let Some(tag) = c.tags().find_by_name(raw) {
            return Ok(tag.id);
        }
        raw.trim()
            .parse::<u64>()
            .ok()
            .map(TagId)
            .filter(|id| c.tags().contains(*id))
            .ok_or_else(|| ExplorerError::NotFound(format!("tag {:?}", raw)))
    })
}

fn print_reference(explorer: &Explorer, reference: &FileReference) {
    let tags: Vec<String> = explorer.read(|c| {
        reference
            .tags
            .iter()
            .filter_map(|t| c.tags().get(*t).map(|tag| tag.name.clone()))
            .collect()
    });
    let size = reference
        .metadata
        .as_ref()
        .map(|m| format!("{} B", m.size))
        .unwrap_or_else(|| "-".to_string());

    if tags.is_empty() {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            reference.id,
            reference.status.as_str(),
            size,
            reference.display_name,
            reference.path
        );
    } else {
        println!(
            "{}\t{}\t{}\t{} (Tags: {})\t{}",
            reference.id,
            reference.status.as_str(),
            size,
            reference.display_name,
            tags.join(", "),
            reference.path
        );
    }
}
