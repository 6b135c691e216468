//! # Grader CLI (`grader`)
//!
//! ## Usage
//!
//! ```bash
//! grader --config ./config/grader.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grader index` | Load the corpus, build the TF-IDF index and write it to `[index].path` |
//! | `grader search "<query>"` | Search the persisted index |
//! | `grader grade <file>` | Grade a submission and print the result as JSON |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from the configured category directories
//! grader index --config ./config/grader.toml
//!
//! # Rubric passages from week 3 files only
//! grader search "thesis statement" --category rubric --allow week3
//!
//! # Grade an essay, steering retrieval with a hint
//! GROQ_API_KEY=... grader grade essay.pdf --hint "week 3 argumentative essay" --rubric week3
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_grader::models::Category;
use rag_grader::{config, grade_cmd, ingest, logging, search};

/// Retrieval-augmented grader for free-text submissions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/grader.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "grader",
    about = "Retrieval-augmented grading of free-text submissions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/grader.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level or filter directive (e.g. `debug`, `rag_grader=trace`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the configured corpus.
    ///
    /// Walks the rubric, question, solution, and exemplar directories,
    /// segments every supported file, and writes the index to `[index].path`.
    Index,

    /// Search the persisted index.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to one category (rubric, question, solution, exemplar).
        #[arg(long)]
        category: Option<Category>,

        /// Path substrings to allow within the category (repeatable).
        #[arg(long = "allow", requires = "category")]
        allow: Vec<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Grade a submission file.
    ///
    /// Reads txt, md, json, pdf, or docx. Requires the API key named by
    /// `[oracle].api_key_env` in the environment.
    Grade {
        /// Submission file.
        file: PathBuf,

        /// Assignment hint used as the retrieval query.
        #[arg(long)]
        hint: Option<String>,

        /// Rubric path substrings to allow (repeatable).
        #[arg(long = "rubric")]
        rubric: Vec<String>,

        /// Question path substrings to allow (repeatable).
        #[arg(long = "question")]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json)?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index => {
            ingest::run_index(&cfg)?;
        }
        Commands::Search {
            query,
            category,
            allow,
            limit,
        } => {
            search::run_search(&cfg, &query, category, &allow, limit)?;
        }
        Commands::Grade {
            file,
            hint,
            rubric,
            question,
        } => {
            grade_cmd::run_grade(&cfg, &file, hint.as_deref(), &rubric, &question).await?;
        }
    }

    Ok(())
}
