//! # locatex CLI
//!
//! The `locatex` binary maintains a file index and answers name queries
//! against it.
//!
//! ## Usage
//!
//! ```bash
//! locatex [--config ~/.locatex/config.toml] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `locatex init` | Create the index database and run schema migrations |
//! | `locatex update` | Walk `scan.root` (or `--root`) and reconcile the index |
//! | `locatex ingest [FILE\|-]` | Reconcile from JSON-lines scan output |
//! | `locatex search <pattern>` | Query indexed names or paths |
//! | `locatex stats` | Show entry counts and last update |
//!
//! ## Examples
//!
//! ```bash
//! # Index a source tree
//! locatex update --root ~/src
//!
//! # Case-insensitive substring search on names
//! locatex search readme
//!
//! # Regex over full paths, all results as JSON lines
//! locatex search '/tests?/.*\.rs$' --regex --path --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use locatex::config;
use locatex::query::MatchMode;
use locatex::search::SearchOptions;
use locatex::store::IndexStore;
use locatex::{ingest, search, stats};

/// locatex: a locate-style file index with substring and regex search.
#[derive(Parser)]
#[command(name = "locatex", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.locatex/config.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and its tables. Safe to run repeatedly.
    Init,

    /// Walk the filesystem and reconcile the index against it.
    Update {
        /// Directory to walk instead of `scan.root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Reconcile the index from JSON-lines scanner output.
    ///
    /// Each line is `{"type":"entry",...}`; the stream must end with
    /// `{"type":"complete"}` or the index is left untouched.
    Ingest {
        /// Input file, or `-` for stdin.
        #[arg(default_value = "-")]
        input: String,
    },

    /// Search indexed entries.
    ///
    /// Builds the index first if it does not exist yet.
    Search {
        /// Pattern to match. An empty pattern matches everything.
        pattern: String,

        /// Treat the pattern as a regular expression.
        #[arg(long, conflicts_with = "prefix")]
        regex: bool,

        /// Match only at the start of the name (or path).
        #[arg(long)]
        prefix: bool,

        /// Match case exactly.
        #[arg(short = 's', long, conflicts_with = "ignore_case")]
        case_sensitive: bool,

        /// Ignore case even if `search.case_sensitive` is set.
        #[arg(short, long)]
        ignore_case: bool,

        /// Match against the full path instead of the final component.
        #[arg(long)]
        path: bool,

        /// Results per page.
        #[arg(long)]
        page_size: Option<i64>,

        /// Print every result without prompting.
        #[arg(long)]
        all: bool,

        /// Print results as JSON lines.
        #[arg(long)]
        json: bool,

        /// Update the index before searching.
        #[arg(long)]
        update: bool,
    },

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let store = IndexStore::from_config(&cfg.index).await?;
            store.close().await;
            println!("Index initialized at {}.", cfg.index.path.display());
        }
        Commands::Update { root } => {
            ingest::run_update(&cfg, root.as_deref()).await?;
        }
        Commands::Ingest { input } => {
            ingest::run_ingest(&cfg, &input).await?;
        }
        Commands::Search {
            pattern,
            regex,
            prefix,
            case_sensitive,
            ignore_case,
            path,
            page_size,
            all,
            json,
            update,
        } => {
            let mut opts = SearchOptions::from_config(&cfg);
            opts.mode = if regex {
                MatchMode::Regex
            } else if prefix {
                MatchMode::Prefix
            } else {
                MatchMode::Substring
            };
            if case_sensitive {
                opts.case_sensitive = true;
            }
            if ignore_case {
                opts.case_sensitive = false;
            }
            opts.match_path |= path;
            if let Some(n) = page_size {
                opts.page_size = n;
            }
            opts.all = all;
            opts.json = json;
            opts.update = update;

            search::run_search(&cfg, &pattern, &opts).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for results.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
