//! Cardwiki CLI
//!
//! Command-line front end for the search compiler:
//! - `tokens`: show how a search is tokenized
//! - `plan`: show the plan steps a search compiles to
//! - `search`: compile, execute and print the result table
//! - `dictionary`: list the phrases a store makes searchable

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use cardwiki_search::{compile, CompileError, Search, SearchConfig, TokenKind};
use cardwiki_store::{DictionaryKind, KnowledgeStore, Value};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cardwiki")]
#[command(author, version, about = "Search a cardwiki store with plain words")]
struct Cli {
    /// Store snapshot (JSON).
    #[arg(long, env = "CARDWIKI_STORE")]
    store: PathBuf,

    /// Search settings (JSON), e.g. `{"hidden_collections": ["unknown"]}`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collection never used to name a bridging hop. Replaces the
    /// configured list when given.
    #[arg(long = "hide-collection", value_name = "COLLECTION")]
    hide_collections: Vec<String>,

    /// More logging on stderr (-v debug, -vv trace). `RUST_LOG` applies
    /// otherwise.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tokens a search is read as.
    Tokens {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Print the plan steps a search compiles to.
    Plan {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Compile and run a search.
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Describe the plan before the results.
        #[arg(long)]
        explain: bool,
    },

    /// List searchable phrases.
    Dictionary {
        #[arg(value_enum)]
        kind: DictionaryArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum DictionaryArg {
    Entities,
    Collections,
    Attributes,
}

impl From<DictionaryArg> for DictionaryKind {
    fn from(arg: DictionaryArg) -> Self {
        match arg {
            DictionaryArg::Entities => DictionaryKind::Entity,
            DictionaryArg::Collections => DictionaryKind::Collection,
            DictionaryArg::Attributes => DictionaryKind::Attribute,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let store = load_store(&cli.store)?;
    let config = load_config(cli.config.as_deref(), cli.hide_collections)?;
    debug!(
        pages = store.page_count(),
        decks = store.deck_count(),
        links = store.link_count(),
        facts = store.eav_count(),
        "loaded store"
    );

    match cli.command {
        Commands::Tokens { query } => cmd_tokens(&store, &config, &query.join(" ")),
        Commands::Plan { query } => cmd_plan(&store, &config, &query.join(" ")),
        Commands::Search {
            query,
            json,
            explain,
        } => cmd_search(&store, &config, &query.join(" "), json, explain),
        Commands::Dictionary { kind } => {
            for phrase in store.dictionary(kind.into()).keys() {
                println!("{phrase}");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {e}"))
}

fn load_store(path: &Path) -> Result<KnowledgeStore> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read store snapshot {}", path.display()))?;
    KnowledgeStore::from_json(&json)
        .with_context(|| format!("failed to load store snapshot {}", path.display()))
}

fn load_config(path: Option<&Path>, hidden: Vec<String>) -> Result<SearchConfig> {
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => SearchConfig::default(),
    };
    if !hidden.is_empty() {
        config.hidden_collections = hidden;
    }
    Ok(config)
}

fn compile_or_explain(store: &KnowledgeStore, config: &SearchConfig, text: &str) -> Result<Search> {
    compile(store, text, config).map_err(|err: CompileError| {
        let message = err.user_message();
        anyhow!(err).context(message)
    })
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_tokens(store: &KnowledgeStore, config: &SearchConfig, text: &str) -> Result<()> {
    // Tokens are shown even when the rest of the compile fails.
    let tokens = cardwiki_search::matcher::match_tokens(store, text);
    for token in &tokens {
        let payload = match &token.kind {
            TokenKind::Entity(s) | TokenKind::Collection(s) | TokenKind::Attribute(s) => s.clone(),
            TokenKind::Modifier(m) => format!("{m:?}").to_lowercase(),
            TokenKind::Operation(op) => op.symbol.to_string(),
            TokenKind::Value(v) => v.to_string(),
        };
        println!(
            "{:>4} {:>3}  {:<10} {}",
            token.position,
            token.length,
            token.kind.label().cyan(),
            payload
        );
    }
    if let Err(err) = compile(store, text, config) {
        eprintln!("{} {}", err.user_message().yellow(), err);
    }
    Ok(())
}

fn cmd_plan(store: &KnowledgeStore, config: &SearchConfig, text: &str) -> Result<()> {
    let search = compile_or_explain(store, config, text)?;
    println!("{}", "tree".bold());
    for line in search.forest.outline() {
        println!("  {line}");
    }
    println!("{}", "steps".bold());
    for (step, line) in search.plan.iter().zip(search.describe()) {
        let related = step
            .related_to
            .map(|r| format!(" (from {r})"))
            .unwrap_or_default();
        println!("  {} {line}{}", step.id.to_string().cyan(), related.dimmed());
    }
    Ok(())
}

fn cmd_search(
    store: &KnowledgeStore,
    config: &SearchConfig,
    text: &str,
    json: bool,
    explain: bool,
) -> Result<()> {
    let search = compile_or_explain(store, config, text)?;
    if explain {
        for line in search.describe() {
            eprintln!("{} {line}", "·".dimmed());
        }
    }
    let result = search
        .query()
        .exec(store)
        .context("failed to run compiled query")?;

    if json {
        let out = serde_json::json!({
            "query": text,
            "columns": result.columns,
            "rows": result.rows,
            "groups": result.group_info,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", result.columns.join("\t").bold());
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        println!("{}", cells.join("\t"));
    }
    eprintln!("{}", format!("{} row(s)", result.rows.len()).green());
    Ok(())
}
