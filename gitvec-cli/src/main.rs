mod embed;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::Confirm;
use gitvec_core::config::Config;
use gitvec_core::gitbackend::{canonical_repo_root, expand_branch_globs, GitBackend};
use gitvec_core::model::AccuracyMode;
use gitvec_core::query::{self, QueryOptions};
use gitvec_core::rebuild::{rebuild_in_background, ArtifactKind};
use gitvec_core::store::collection::Collection;
use gitvec_core::store::write::scan_vector_files;
use gitvec_core::store::HnswAnnIndex;
use gitvec_core::temporal::ingest::{IngestProgress, IngestionPipeline};
use gitvec_core::temporal::{temporal_index_exists, IndexingMode};
use indicatif::{ProgressBar, ProgressStyle};

use embed::{HttpEmbedder, LineChunker};

#[derive(Parser, Debug)]
#[command(name = "gitvec", version, about = "Semantic code search over a git repository", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Repository root; defaults to the current directory.
    #[arg(short, long, global = true)]
    repo: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the repository's current branch into its semantic collection.
    Index {
        /// Walk every local branch instead of just HEAD.
        #[arg(long)]
        all_branches: bool,
        /// Glob pattern(s) selecting which local branches to walk (e.g.
        /// `feature/*`). Ignored when `--all-branches` is set.
        #[arg(long = "branches", value_delimiter = ',')]
        branches: Vec<String>,
        /// Skip the cost-warning confirmation prompt for `--all-branches`.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Run a semantic query against the collection.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        show_evolution: bool,
        #[arg(long)]
        include_removed: bool,
    },
    /// Report collection and temporal-index health.
    Status {
        /// Scan every vector file for schema/path corruption.
        #[arg(long)]
        validate: bool,
    },
    /// Page through the collection's stored points.
    Scroll {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Print the total number of indexed points.
    Count,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init().ok();
    let args = Args::parse();
    let repo_root = resolve_repo_root(args.repo.as_deref())?;

    match args.command {
        Commands::Index { all_branches, branches, yes } => cmd_index(&repo_root, all_branches, &branches, yes),
        Commands::Search { query, limit, show_evolution, include_removed } => {
            cmd_search(&repo_root, &query, limit, show_evolution, include_removed)
        }
        Commands::Status { validate } => cmd_status(&repo_root, validate),
        Commands::Scroll { limit } => cmd_scroll(&repo_root, limit),
        Commands::Count => cmd_count(&repo_root),
    }
}

fn resolve_repo_root(path: Option<&Path>) -> Result<PathBuf> {
    let start = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?,
    };
    Ok(canonical_repo_root(&start)?)
}

fn collection_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".code-indexer").join("collection")
}

fn open_or_create_collection(repo_root: &Path, config: &Config) -> Result<Collection> {
    let dir = collection_dir(repo_root);
    if Collection::exists(&dir) {
        Ok(Collection::open(dir, config.clone())?)
    } else {
        let vector_size: usize = std::env::var("GITVEC_VECTOR_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(768);
        Ok(Collection::create(dir, "default", vector_size, "http", "default", config.clone())?)
    }
}

fn cmd_index(repo_root: &Path, all_branches: bool, branch_patterns: &[String], yes: bool) -> Result<()> {
    let config = Config::load(repo_root).unwrap_or_default();
    let embedder = HttpEmbedder::from_env();
    let chunker = LineChunker::default();
    let collection = open_or_create_collection(repo_root, &config)?;
    let git = GitBackend::new(repo_root);

    let (mode, branches) = if all_branches {
        let all = git.local_branches()?;
        let estimate = git.estimate_branch_cost(&all)?;
        println!(
            "{} indexing {} branch(es), ~{} commit(s) total (embeddings, storage, and any remote API calls scale with this).",
            style("warning:").yellow(),
            estimate.branch_count,
            estimate.total_commits
        );
        if !yes && !Confirm::new().with_prompt("proceed?").default(false).interact()? {
            println!("aborted");
            return Ok(());
        }
        (IndexingMode::AllBranches, all)
    } else if !branch_patterns.is_empty() {
        let all = git.local_branches()?;
        let matched = expand_branch_globs(branch_patterns, &all);
        if matched.is_empty() {
            return Err(anyhow!("no local branches matched patterns {branch_patterns:?}"));
        }
        (IndexingMode::Selective, matched)
    } else {
        (IndexingMode::SingleBranch, vec!["HEAD".to_string()])
    };

    let embedding_model = collection.meta.read().unwrap().embedding_model.clone();

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());

    let mut pipeline = IngestionPipeline::new(repo_root.to_path_buf(), &config)?;
    let stats = pipeline.run(
        &collection,
        &embedder,
        &chunker,
        &embedding_model,
        mode,
        &branches,
        &config.excluded_extensions,
        &|p: IngestProgress| {
            bar.set_message(format!("{}/{} {}", p.current, p.total, p.info));
            bar.tick();
        },
    )?;
    bar.finish_and_clear();

    rebuild_in_background(&collection, ArtifactKind::Hnsw, gitvec_core::store::build_hnsw_artifact, |_| {})?;

    println!("{} indexed {} repository", style("\u{2713}").green(), repo_root.display());
    println!("  dedup ratio: {:.2}", stats.dedup_ratio);
    for (branch, count) in &stats.commits_per_branch {
        println!("  {branch}: {count} commit(s)");
    }
    Ok(())
}

fn cmd_search(repo_root: &Path, q: &str, limit: usize, show_evolution: bool, include_removed: bool) -> Result<()> {
    let config = Config::load(repo_root).unwrap_or_default();
    let embedder = HttpEmbedder::from_env();
    let collection = open_or_create_collection(repo_root, &config)?;

    let opts = QueryOptions { limit, accuracy: AccuracyMode::Balanced, show_evolution, include_removed, ..QueryOptions::default() };

    let hnsw_path = collection.hnsw_path();
    let loaded_index = if hnsw_path.exists() { HnswAnnIndex::load(&hnsw_path).ok() } else { None };
    let ann = loaded_index.as_ref().map(|i| i as &dyn gitvec_core::store::AnnIndex);

    let result = query::query(repo_root, &collection, &embedder, ann, q, &opts)?;

    if let Some(warning) = &result.warning {
        eprintln!("{} {}", style("warning:").yellow(), warning);
    }
    for hit in &result.hits {
        println!("{}  {:.4}  {}:{}-{}", style(&hit.id).cyan(), hit.score, hit.file_path, hit.start_line, hit.end_line);
        if hit.staleness.is_stale {
            println!("  {} {}", style("stale:").red(), hit.staleness.staleness_reason.as_deref().unwrap_or("unknown"));
        }
    }
    if result.hits.is_empty() {
        println!("no matches");
    }
    Ok(())
}

fn cmd_status(repo_root: &Path, validate: bool) -> Result<()> {
    let config = Config::load(repo_root).unwrap_or_default();
    let dir = collection_dir(repo_root);
    if !Collection::exists(&dir) {
        println!("no collection at {}", dir.display());
        return Ok(());
    }
    let collection = Collection::open(dir, config)?;
    let meta = collection.meta.read().unwrap();

    println!("collection: {}", meta.name);
    println!("  points: {}", meta.point_count);
    println!("  vector size: {}", meta.vector_size);
    println!("  embedding model: {}", meta.embedding_model);
    println!("  hnsw stale: {}", meta.fingerprints.hnsw_stale);
    println!("  id index stale: {}", meta.fingerprints.id_index_stale);
    println!("  temporal index: {}", if temporal_index_exists(repo_root) { "present" } else { "absent" });
    drop(meta);

    if validate {
        let total = count_vector_files(&collection.root);
        let clean = scan_vector_files(&collection).len();
        println!("  scanned {total} vector file(s): {clean} clean, {} corrupt", total.saturating_sub(clean));
    }
    Ok(())
}

fn count_vector_files(collection_root: &Path) -> usize {
    walkdir::WalkDir::new(collection_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().map(|n| n.starts_with("vector_") && n.ends_with(".text")).unwrap_or(false))
        .count()
}

fn cmd_scroll(repo_root: &Path, limit: usize) -> Result<()> {
    let config = Config::load(repo_root).unwrap_or_default();
    let dir = collection_dir(repo_root);
    if !Collection::exists(&dir) {
        return Err(anyhow!("no collection at {}", dir.display()));
    }
    let collection = Collection::open(dir, config)?;
    for (_, record) in scan_vector_files(&collection).into_iter().take(limit) {
        println!("{}  {}:{}-{}", record.id, record.file_path, record.start_line, record.end_line);
    }
    Ok(())
}

fn cmd_count(repo_root: &Path) -> Result<()> {
    let config = Config::load(repo_root).unwrap_or_default();
    let dir = collection_dir(repo_root);
    if !Collection::exists(&dir) {
        println!("0");
        return Ok(());
    }
    let collection = Collection::open(dir, config)?;
    println!("{}", scan_vector_files(&collection).len());
    Ok(())
}
