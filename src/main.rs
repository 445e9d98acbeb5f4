// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pakt::index::{BinaryIndex, Package};
use pakt::prefix::{self, PrefixContext};
use pakt::repository;
use pakt::solver::{Goal, SolveOptions, solve};
use pakt::state::models::Repository;
use pakt::version::{Version, VersionConstraint};
use std::path::Path;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pakt")]
#[command(author, version, about = "Cross-platform package manager for user-owned installation prefixes", long_about = None)]
struct Cli {
    /// Use PATH as the installation prefix
    #[arg(short = 'p', long, global = true, value_name = "PATH")]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new installation prefix
    Mkprefix {
        /// Directory to create the prefix in
        path: String,
        /// Also configure a repository with this URL
        #[arg(long)]
        url: Option<String>,
        /// Name for the configured repository
        #[arg(long, default_value = "main")]
        name: String,
    },
    /// Fetch the package lists of all enabled repositories
    Update,
    /// Install packages (NAME or NAME=VERSION)
    Install {
        /// Packages to install
        #[arg(required = true)]
        packages: Vec<String>,
        /// Print the action plan without applying it
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove installed packages
    Remove {
        /// Packages to remove
        #[arg(required = true)]
        packages: Vec<String>,
        /// Also remove installed packages that depend on the target
        #[arg(long)]
        cascade: bool,
        /// Print the action plan without applying it
        #[arg(long)]
        dry_run: bool,
    },
    /// Upgrade every installed package to the newest available version
    Upgrade {
        /// Print the action plan without applying it
        #[arg(long)]
        dry_run: bool,
    },
    /// List installed packages
    List,
    /// Search available packages by name or description
    Search {
        /// Search term
        term: String,
    },
    /// Show the reverse dependencies of a package
    Rdepends {
        /// Package to inspect (NAME, NAME=VERSION, or a sumsha with --sumsha)
        target: String,
        /// Print the reverse dependencies recursively
        #[arg(short = 'r', long)]
        recursive: bool,
        /// Only consider packages provided by this repository
        #[arg(long, value_name = "REPO")]
        repo: Option<String>,
        /// Look the package up by its sumsha instead of its name
        #[arg(long)]
        sumsha: bool,
    },
    /// Run a command with the prefix environment injected
    Runprefix {
        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Manage the repositories of a prefix
    #[command(subcommand)]
    Repo(RepoCommands),
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository name
        name: String,
        /// Repository URL
        url: String,
        /// Priority (higher = preferred)
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Add the repository disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a repository
    Remove {
        /// Repository name
        name: String,
    },
    /// List configured repositories
    List,
    /// Enable a repository
    Enable {
        /// Repository name
        name: String,
    },
    /// Disable a repository
    Disable {
        /// Repository name
        name: String,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let Cli {
        prefix: prefix_flag,
        command,
    } = Cli::parse();
    let resolve_root = || prefix::resolve_root(prefix_flag.as_deref());

    match command {
        Commands::Mkprefix { path, url, name } => {
            let ctx = PrefixContext::create(Path::new(&path))?;
            if let Some(url) = url {
                repository::add_repository(&ctx.conn, name, url, true, 0)?;
            }
            println!("Prefix created at: {}", path);
            Ok(())
        }
        Commands::Update => {
            let ctx = PrefixContext::open(&resolve_root()?)?;
            let repos = Repository::list_all(&ctx.conn)?;
            if repos.is_empty() {
                println!("No repositories configured. Add one with 'pakt repo add'.");
                return Ok(());
            }

            let mut failures = 0;
            for mut repo in repos {
                if !repo.enabled {
                    continue;
                }
                match repository::sync_repository(&ctx.conn, &mut repo) {
                    Ok(count) => println!("{}: {} packages", repo.name, count),
                    Err(e) => {
                        warn!("Failed to sync repository '{}': {}", repo.name, e);
                        eprintln!("Failed to sync repository '{}': {}", repo.name, e);
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                return Err(anyhow::anyhow!("{} repositories failed to sync", failures));
            }
            Ok(())
        }
        Commands::Install { packages, dry_run } => {
            let mut ctx = PrefixContext::open(&resolve_root()?)?;
            let (index, _) = ctx.load_index()?;

            for spec in &packages {
                let (name, constraint) = parse_pkg_spec(spec)?;
                let installed = ctx.load_installed()?;
                let goal = Goal::Install { name, constraint };
                let plan = solve(&goal, &installed, &index, &SolveOptions::default())?;

                if plan.is_empty() {
                    println!("{} is already installed, nothing to do", spec);
                    continue;
                }
                print_plan(&plan);
                if dry_run {
                    continue;
                }
                pakt::install::apply_plan(&mut ctx, &plan)?;
                info!("Applied plan for '{}'", spec);
            }
            Ok(())
        }
        Commands::Remove {
            packages,
            cascade,
            dry_run,
        } => {
            let mut ctx = PrefixContext::open(&resolve_root()?)?;
            let (index, _) = ctx.load_index()?;
            let options = SolveOptions {
                cascade_remove: cascade,
            };

            for name in &packages {
                let installed = ctx.load_installed()?;
                let goal = Goal::Remove { name: name.clone() };
                let plan = solve(&goal, &installed, &index, &options)?;

                print_plan(&plan);
                if dry_run {
                    continue;
                }
                pakt::install::apply_plan(&mut ctx, &plan)?;
            }
            Ok(())
        }
        Commands::Upgrade { dry_run } => {
            let mut ctx = PrefixContext::open(&resolve_root()?)?;
            let installed = ctx.load_installed()?;
            let (index, _) = ctx.load_index()?;

            let plan = solve(
                &Goal::UpgradeAll,
                &installed,
                &index,
                &SolveOptions::default(),
            )?;
            if plan.is_empty() {
                println!("All packages are up to date.");
                return Ok(());
            }

            print_plan(&plan);
            if !dry_run {
                pakt::install::apply_plan(&mut ctx, &plan)?;
            }
            Ok(())
        }
        Commands::List => {
            let ctx = PrefixContext::open(&resolve_root()?)?;
            let installed = ctx.load_installed()?;

            if installed.is_empty() {
                println!("No packages installed.");
            } else {
                for entry in installed.iter() {
                    println!("{} ({})", entry.name, entry.version);
                }
                println!("\nTotal: {} package(s)", installed.len());
            }
            Ok(())
        }
        Commands::Search { term } => {
            let ctx = PrefixContext::open(&resolve_root()?)?;
            let (index, _) = ctx.load_index()?;

            let needle = term.to_lowercase();
            let mut matches: Vec<&Package> = index
                .packages()
                .filter(|p| {
                    p.name.to_lowercase().contains(&needle)
                        || p.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(&needle))
                })
                .collect();
            matches.sort_by(|a, b| a.name.cmp(&b.name).then(b.version.cmp(&a.version)));

            if matches.is_empty() {
                println!("No package found");
            } else {
                for pkg in matches {
                    match &pkg.description {
                        Some(desc) => println!("{} ({}) - {}", pkg.name, pkg.version, desc),
                        None => println!("{} ({})", pkg.name, pkg.version),
                    }
                }
            }
            Ok(())
        }
        Commands::Rdepends {
            target,
            recursive,
            repo,
            sumsha,
        } => {
            let ctx = PrefixContext::open(&resolve_root()?)?;
            let (index, _) = ctx.load_index()?;

            let Some(pkg) = resolve_target(&index, &target, sumsha) else {
                println!("No package found");
                return Err(anyhow::anyhow!("package '{}' not found", target));
            };
            if let Some(repo_name) = repo.as_deref() {
                if !pkg.in_repository(repo_name) {
                    println!("No package found");
                    return Err(anyhow::anyhow!(
                        "package '{}' is not provided by repository '{}'",
                        target,
                        repo_name
                    ));
                }
            }

            let mut rdeps: Vec<&Package> = if recursive {
                index.transitive_reverse_dependents(pkg, repo.as_deref())
            } else {
                index.reverse_dependents(pkg, repo.as_deref()).collect()
            };

            if rdeps.is_empty() {
                println!("No package found");
            } else {
                rdeps.sort_by(|a, b| a.name.cmp(&b.name).then(b.version.cmp(&a.version)));
                for rdep in rdeps {
                    println!("{} ({})", rdep.name, rdep.version);
                }
            }
            Ok(())
        }
        Commands::Runprefix { command } => {
            let ctx = PrefixContext::open(&resolve_root()?)?;
            let (program, args) = command
                .split_first()
                .expect("clap requires at least one argument");
            let code = ctx.run_command(program, args)?;
            std::process::exit(code);
        }
        Commands::Repo(repo_cmd) => {
            let ctx = PrefixContext::open(&resolve_root()?)?;
            match repo_cmd {
                RepoCommands::Add {
                    name,
                    url,
                    priority,
                    disabled,
                } => {
                    let repo =
                        repository::add_repository(&ctx.conn, name, url, !disabled, priority)?;
                    println!("Added repository: {} ({})", repo.name, repo.url);
                }
                RepoCommands::Remove { name } => {
                    repository::remove_repository(&ctx.conn, &name)?;
                    println!("Removed repository: {}", name);
                }
                RepoCommands::List => {
                    let repos = Repository::list_all(&ctx.conn)?;
                    if repos.is_empty() {
                        println!("No repositories configured.");
                    } else {
                        for repo in repos {
                            println!(
                                "{} {} [{}] priority={}",
                                repo.name,
                                repo.url,
                                if repo.enabled { "enabled" } else { "disabled" },
                                repo.priority
                            );
                        }
                    }
                }
                RepoCommands::Enable { name } => {
                    repository::set_repository_enabled(&ctx.conn, &name, true)?;
                    println!("Repository '{}' enabled", name);
                }
                RepoCommands::Disable { name } => {
                    repository::set_repository_enabled(&ctx.conn, &name, false)?;
                    println!("Repository '{}' disabled", name);
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pakt", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Parse an install argument: NAME or NAME=VERSION
fn parse_pkg_spec(spec: &str) -> Result<(String, VersionConstraint)> {
    match spec.split_once('=') {
        Some((name, version)) => {
            if name.is_empty() {
                return Err(anyhow::anyhow!("invalid package spec '{}'", spec));
            }
            let version = Version::parse(version)?;
            Ok((name.to_string(), VersionConstraint::Exact(version)))
        }
        None => Ok((spec.to_string(), VersionConstraint::Any)),
    }
}

/// Resolve an rdepends target against the index
///
/// By name (highest version wins), by NAME=VERSION, or by sumsha.
fn resolve_target<'a>(index: &'a BinaryIndex, target: &str, by_sumsha: bool) -> Option<&'a Package> {
    if by_sumsha {
        return index.find_by_sumsha(target);
    }
    match target.split_once('=') {
        Some((name, version)) => {
            let version = Version::parse(version).ok()?;
            index.find_by_name_version(name, &version)
        }
        None => index.find_by_name(target).into_iter().next(),
    }
}

/// Print an action plan, one action per line
fn print_plan(plan: &pakt::solver::ActionPlan) {
    println!("The following actions will be performed:");
    for action in plan.iter() {
        println!("  {}", action);
    }
}
