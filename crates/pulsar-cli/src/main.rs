//! Pulsar CLI - Reactive computational documents.

mod check;
mod colors;
mod document;
mod graph;
mod output;
mod run;
mod watch;
mod watcher;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pulsar")]
#[command(about = "Reactive execution engine for computational documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// Path to an engine configuration file (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Run independent cells of each level in parallel
    #[arg(long)]
    parallel: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every cell of a document once
    Run {
        /// Path to the document
        document: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report parse errors, conflicts and cycles without running anything
    Check {
        /// Path to the document
        document: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency edges and execution order
    Graph {
        /// Path to the document
        document: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch a document and re-run affected cells on every save
    Watch {
        /// Path to the document
        document: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// Clear screen before each run
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Attach recovery hints to engine errors
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<pulsar_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Run {
            document,
            engine,
            json,
        } => {
            let config = document::load_config(engine.config.as_deref(), engine.parallel)
                .map_err(format_error)?;
            run::execute(&document, config, json).map_err(format_error)?;
        }

        Commands::Check {
            document,
            engine,
            json,
        } => {
            let config = document::load_config(engine.config.as_deref(), engine.parallel)
                .map_err(format_error)?;
            let has_errors = check::execute(&document, config, json).map_err(format_error)?;
            if has_errors {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Graph {
            document,
            engine,
            json,
        } => {
            let config = document::load_config(engine.config.as_deref(), engine.parallel)
                .map_err(format_error)?;
            graph::execute(&document, config, json).map_err(format_error)?;
        }

        Commands::Watch {
            document,
            engine,
            clear,
        } => {
            let config = document::load_config(engine.config.as_deref(), engine.parallel)
                .map_err(format_error)?;
            watch::execute(&document, config, clear)
                .await
                .map_err(format_error)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
