use aiql::config::AppConfig;
use aiql::db::MySqlExecutor;
use aiql::extract::{Extraction, SqlExtractor};
use aiql::format::{render, OutputFormat};
use aiql::orchestrator::Orchestrator;
use aiql::seed;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aiql")]
#[command(about = "Ask questions about your database in plain language")]
#[command(version)]
struct Args {
    /// JSON config file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model name as known to Ollama
    #[arg(long, global = true)]
    model: Option<String>,

    /// Reject completions without a SQL keyword instead of passing them through
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate SQL for a question, confirm, and run it
    Ask {
        /// The question; read interactively when omitted
        question: Option<String>,

        /// Execute without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Run only the extractor over a completion from a file or stdin
    Extract {
        file: Option<PathBuf>,
    },
    /// Replace the calls table with random demo data
    Seed {
        #[arg(short, long, default_value_t = 500)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model.model_id = model;
    }
    if args.strict {
        config.strict_fallback = true;
    }

    match args.command {
        Commands::Ask {
            question,
            yes,
            format,
        } => ask(&config, question, yes, format).await,
        Commands::Extract { file } => extract(&config, file),
        Commands::Seed { count } => {
            let executor = MySqlExecutor::new(&config.database);
            let inserted = seed::reseed(&executor, count).await?;
            println!("Inserted {} fake call records.", inserted);
            Ok(())
        }
    }
}

async fn ask(
    config: &AppConfig,
    question: Option<String>,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    let question = match question {
        Some(question) => question,
        None => prompt_line("Ask a question about your data: ")?,
    };
    if question.trim().is_empty() {
        anyhow::bail!("Please enter a question.");
    }

    let orchestrator = Orchestrator::from_config(config)?;
    info!("Using model {}", orchestrator.model_id());

    let generated = orchestrator.generate_sql(&question).await?;
    println!("\nGenerated SQL:\n{}\n", generated.sql);

    if !yes {
        let answer = prompt_line("Execute this query? [y/N] ")?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Query not executed.");
            return Ok(());
        }
    }

    let outcome = orchestrator.execute(&generated.sql).await?;
    println!("{}", render(&outcome, format)?);
    Ok(())
}

fn extract(config: &AppConfig, file: Option<PathBuf>) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut steps = Vec::new();
    let extraction =
        SqlExtractor::new(config.fallback_policy()).extract_with_steps(&raw, &mut steps);
    for step in &steps {
        info!("{}", step);
    }

    match extraction {
        Extraction::Sql(sql) => {
            println!("{}", sql);
            Ok(())
        }
        Extraction::NoSql(reason) => {
            eprintln!("No SQL: {}", reason);
            std::process::exit(1);
        }
    }
}

fn prompt_line(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
