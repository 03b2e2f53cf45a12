mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use ebuild_atom::Atom;
use ebuild_resolver::repository::RepositoryDocument;
use ebuild_resolver::{MemoryRepository, MergePlan, Policy, Repository, ResolverConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "pmerge")]
#[command(about = "Resolve package atoms into an ordered merge plan")]
struct Args {
    /// Repository document to take candidates from (can be used multiple times)
    #[arg(long = "repo", value_name = "FILE", action = clap::ArgAction::Append)]
    repos: Vec<PathBuf>,

    /// Installed package database document (can be used multiple times)
    #[arg(long = "vdb", value_name = "FILE", action = clap::ArgAction::Append)]
    vdbs: Vec<PathBuf>,

    /// Resolver configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// How candidates for an atom are ordered
    #[arg(long, value_enum, default_value_t = Strategy::Highest)]
    strategy: Strategy,

    /// Retry failed atoms with cyclic dependencies dropped
    #[arg(long)]
    drop_cycles: bool,

    /// Skip atoms that cannot be resolved instead of stopping
    #[arg(long)]
    ignore_failures: bool,

    /// Also list installed packages that stay in place
    #[arg(long)]
    with_livefs: bool,

    /// Show resolver debug output
    #[arg(short, long)]
    verbose: bool,

    /// Atoms to resolve
    #[arg(value_name = "ATOM", required = true)]
    atoms: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    /// Newest version first
    Highest,
    /// Oldest version first
    Lowest,
    /// Keep installed packages where possible
    Reuse,
}

impl Strategy {
    fn policy(self) -> Policy {
        match self {
            Strategy::Highest => Policy::highest(),
            Strategy::Lowest => Policy::lowest(),
            Strategy::Reuse => Policy::reuse(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn load_repository(path: &Path, livefs: bool) -> Result<Box<dyn Repository>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut doc: RepositoryDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    doc.livefs |= livefs;

    let repo = MemoryRepository::from_document(doc)
        .with_context(|| format!("Invalid repository {}", path.display()))?;
    log::debug!("Loaded {} packages from {}", repo.len(), path.display());
    Ok(Box::new(repo))
}

fn load_config(args: &Args) -> Result<ResolverConfig> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ResolverConfig::default(),
    };
    if args.drop_cycles {
        config.drop_cycles = true;
    }
    Ok(config)
}

fn parse_atoms(atoms: &[String]) -> Result<Vec<Atom>> {
    atoms
        .iter()
        .map(|s| Atom::parse(s).with_context(|| format!("Invalid atom \"{}\"", s)))
        .collect()
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args)?;
    let atoms = parse_atoms(&args.atoms)?;

    let mut repos = Vec::new();
    for path in &args.vdbs {
        repos.push(load_repository(path, true)?);
    }
    for path in &args.repos {
        repos.push(load_repository(path, false)?);
    }
    if repos.is_empty() {
        bail!("No repositories given, pass at least one --repo or --vdb");
    }

    let mut plan = MergePlan::new(repos, args.strategy.policy(), config);

    let mut skipped = Vec::new();
    if args.ignore_failures {
        for atom in &atoms {
            let mark = plan.current_mark();
            if let Err(failure) = plan.add_atoms(std::slice::from_ref(atom), false) {
                output::print_failure(&failure);
                plan.reset(mark);
                skipped.push(failure.atom);
            }
        }
    } else if let Err(failure) = plan.add_atoms(&atoms, false) {
        output::print_failure(&failure);
        return Ok(1);
    }

    if args.with_livefs {
        plan.load_livefs_state();
    }
    output::print_plan(&plan, args.with_livefs);

    if !skipped.is_empty() {
        let skipped: Vec<String> = skipped.iter().map(|a| a.to_string()).collect();
        eprintln!(
            "{} Skipped unresolvable atoms: {}",
            style("Warning:").yellow(),
            skipped.join(", ")
        );
    }
    Ok(0)
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
