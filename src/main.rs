//! CADA phenotype-based gene prioritization main executable

pub mod common;
pub mod dump_graph;
pub mod embed;
pub mod err;
pub mod genes;
pub mod graph;
pub mod links;
pub mod model;
pub mod ontology;
pub mod param_opt;
pub mod pbs;
pub mod predict;
pub mod train;

use std::process::{ExitCode, Termination};

use clap::{Parser, Subcommand};
use console::{Emoji, Term};

use crate::err::{AppError, ScoreError};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Phenotype-based gene prioritization",
    long_about = "This tool trains graph embedding models of genes and phenotypes and \
    uses them for prioritizing genes by phenotype"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Train a model.
    Train(train::Args),
    /// Prioritize genes with a trained model.
    Predict(predict::Args),
    /// Train and validate with embedding parameters.
    ParamOpt(param_opt::Args),
    /// Dump the graph of a trained model.
    DumpGraph(dump_graph::Args),
}

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Train(args) => train::run(&cli.common, args)?,
            Commands::Predict(args) => predict::run(&cli.common, args)?,
            Commands::ParamOpt(args) => param_opt::run(&cli.common, args)?,
            Commands::DumpGraph(args) => dump_graph::run(&cli.common, args)?,
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}

/// The application error with a dedicated exit code behind `err`, if any.
fn app_error_of(err: &anyhow::Error) -> Option<AppError> {
    err.downcast_ref::<ScoreError>()
        .cloned()
        .and_then(Option::<AppError>::from)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            match app_error_of(&e) {
                Some(app_error) => app_error.report(),
                None => ExitCode::FAILURE,
            }
        }
    }
}
