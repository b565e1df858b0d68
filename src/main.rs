//! # Serendipomatic CLI (`serendip`)
//!
//! The `serendip` binary creates the database, runs the web front-end,
//! extracts search terms from the command line, and deploys releases.
//!
//! ## Usage
//!
//! ```bash
//! serendip --config ./config/serendip.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serendip init` | Create the SQLite database and run schema migrations |
//! | `serendip serve` | Start the web front-end and JSON API |
//! | `serendip keywords "<text>"` | Most frequent non-stopword tokens |
//! | `serendip terms "<text>"` | DBpedia Spotlight keywords, people and places |
//! | `serendip users` | List linked Zotero accounts |
//! | `serendip deploy <task>` | Package, deploy, revert or prune releases |
//!
//! ## Examples
//!
//! ```bash
//! # Keywords from a file, top 10
//! serendip keywords --file chapter1.txt --max-items 10
//!
//! # Ship the checked-out revision to [deploy].host
//! serendip deploy deploy --config ./config/serendip.toml
//!
//! # Roll back to the previous build
//! serendip deploy revert
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use serendipomatic::config::{self, Config};
use serendipomatic::deploy::{self, Deployer};
use serendipomatic::keywords::common_words;
use serendipomatic::models::SearchTerms;
use serendipomatic::spotlight::SpotlightClient;
use serendipomatic::stopwords::Stopwords;
use serendipomatic::{db, migrate, server, users};

/// Serendipomatic: search terms from text and Zotero libraries.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/serendip.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "serendip",
    about = "Serendipomatic: search terms from text and Zotero libraries",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/serendip.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `zotero_users` table.
    /// Safe to run repeatedly.
    Init,

    /// Start the web front-end on `[server].bind`.
    Serve,

    /// Print the most frequent non-stopword tokens of a text.
    ///
    /// Works without a config file; `[keywords]` settings apply when one
    /// is found.
    Keywords {
        /// Text to analyse. Read from `--file` or stdin when omitted.
        text: Option<String>,

        /// Read the text from a file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Number of keywords to return (defaults to `[keywords].max_items`).
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Query DBpedia Spotlight for keywords, people and places.
    Terms {
        /// Text to analyse. Read from `--file` or stdin when omitted.
        text: Option<String>,

        /// Read the text from a file.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List linked Zotero accounts.
    Users,

    /// Release packaging and deployment tasks.
    Deploy {
        #[command(subcommand)]
        task: DeployTask,
    },
}

#[derive(Subcommand)]
enum DeployTask {
    /// Export the checked-out revision and pack it into `dist/`.
    BuildSourcePackage,
    /// Package, upload, install and activate a release.
    Deploy,
    /// Make the previous build current again and restore the database.
    Revert,
    /// Remove local `build/` and `dist/`.
    Clean,
    /// Diff the settings of the current and previous builds.
    CompareLocalsettings,
    /// Remove build directories beyond `[deploy].keep_builds`.
    RmOldBuilds,
    /// Create or update the database schema of the current build.
    Syncdb,
}

/// Text from the positional argument, `--file`, or stdin, in that order.
fn read_text(text: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => std::io::read_to_string(std::io::stdin())
            .with_context(|| "Failed to read text from stdin")?,
    };
    if text.trim().is_empty() {
        bail!("No text given");
    }
    Ok(text)
}

fn print_terms(terms: &SearchTerms) {
    for (label, list) in [
        ("keywords", terms.keywords.as_slice()),
        ("people", terms.people()),
        ("places", terms.places()),
    ] {
        if !list.is_empty() {
            println!("{}: {}", label, list.join(", "));
        }
    }
}

fn run_deploy(cfg: &Config, task: DeployTask) -> anyhow::Result<()> {
    let workdir = std::env::current_dir().with_context(|| "Failed to read working directory")?;
    let deployer = Deployer::new(cfg.deploy()?, &workdir);

    match task {
        DeployTask::BuildSourcePackage => {
            deployer.build_source_package()?;
        }
        DeployTask::Deploy => {
            deployer.deploy()?;
        }
        DeployTask::Revert => {
            deployer.revert()?;
        }
        DeployTask::Clean => {
            // Handled above (before config loading)
            unreachable!()
        }
        DeployTask::CompareLocalsettings => {
            if deployer.compare_localsettings()?.is_none() {
                println!("No previous deploy to compare against");
            }
        }
        DeployTask::RmOldBuilds => {
            deployer.rm_old_builds()?;
        }
        DeployTask::Syncdb => {
            deployer.syncdb("current")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("serendipomatic=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match cli.command {
        Commands::Keywords {
            text,
            file,
            max_items,
        } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let text = read_text(text, file)?;
            let stopwords = Stopwords::with_extra(&cfg.keywords.extra_stopwords);
            let max_items = max_items.unwrap_or(cfg.keywords.max_items);
            print_terms(&common_words(&text, max_items, &stopwords));
            return Ok(());
        }
        Commands::Terms { text, file } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let text = read_text(text, file)?;
            let client = SpotlightClient::new(&cfg.spotlight)?;
            print_terms(&client.get_search_terms(&text).await?);
            return Ok(());
        }
        Commands::Deploy {
            task: DeployTask::Clean,
        } => {
            let workdir =
                std::env::current_dir().with_context(|| "Failed to read working directory")?;
            for dir in deploy::source::clean(&workdir)? {
                println!("Removed {}", dir.display());
            }
            return Ok(());
        }
        command => {
            let cfg = config::load_config(&cli.config)?;
            match command {
                Commands::Init => {
                    migrate::run_migrations(&cfg).await?;
                    println!("Database initialized successfully.");
                }
                Commands::Serve => {
                    server::run_server(&cfg).await?;
                }
                Commands::Users => {
                    let pool = db::connect(&cfg).await?;
                    migrate::migrate_pool(&pool).await?;
                    let linked = users::list_zotero_users(&pool).await?;
                    if linked.is_empty() {
                        println!("No linked Zotero accounts.");
                    }
                    for user in linked {
                        let updated = chrono::DateTime::from_timestamp(user.updated_at, 0)
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default();
                        println!("{}\t{}\t{}", user.zotero_userid, user.username, updated);
                    }
                }
                Commands::Deploy { task } => {
                    run_deploy(&cfg, task)?;
                }
                Commands::Keywords { .. } | Commands::Terms { .. } => {
                    // Handled above (before config loading)
                    unreachable!()
                }
            }
        }
    }

    Ok(())
}
