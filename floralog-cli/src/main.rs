//! Floralog CLI - plant observation cataloguing tool.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   success
  1   general error
  64  usage error
  65  data error (file is not a decodable image)
  66  cannot read input file
  69  server or identification provider unreachable
  74  cannot write output";

#[derive(Parser)]
#[command(name = "floralog")]
#[command(author, version, about = "Plant observation cataloguing", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Suppress decorative output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest photos through the observation pipeline
    Ingest {
        /// Image files to ingest
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Base URL of the floralog server
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Provider project/flora scope
        #[arg(long, default_value = "all")]
        project: String,

        /// Plant organ hint forwarded to the provider
        #[arg(long, default_value = "auto")]
        organs: String,

        /// Run the pipeline locally with mock identification and an
        /// in-memory store; nothing leaves the machine
        #[arg(long)]
        offline: bool,
    },

    /// List stored observations from the server
    List {
        /// Base URL of the floralog server
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Only observations submitted from this device
        #[arg(long)]
        mine: bool,
    },

    /// Print this device's persistent submitter ID
    Whoami,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ingest {
            files,
            server,
            project,
            organs,
            offline,
        } => commands::ingest::execute(files, server, project, organs, offline, cli.quiet).await,
        Commands::List { server, mine } => commands::list::execute(server, mine, cli.quiet).await,
        Commands::Whoami => commands::whoami::execute(),
    };

    if let Err(err) = result {
        let exit = exit_codes::ExitCode::from_anyhow(&err);
        eprintln!("{} {:#}", "error:".red().bold(), err);
        process::exit(exit.code);
    }
}
