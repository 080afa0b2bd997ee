use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod catalog;
mod commands;
mod output;
mod roster;

#[derive(Parser)]
#[command(
    name = "conch",
    version,
    about = "Interactive command console with autocomplete and history"
)]
struct Cli {
    /// Workspace directory holding the .conch runtime files.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Verbose logging to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    /// Machine-readable JSON output where supported.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive console (default).
    Run,
    /// Execute a single command and print its feedback.
    Exec(ExecArgs),
    /// Print the command vocabulary.
    Vocab,
}

#[derive(clap::Args)]
pub(crate) struct ExecArgs {
    /// Command text, e.g. `conch exec add n/John p/98765432`.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => commands::run::run_console_session(&cwd, cli.verbose),
        Command::Exec(args) => commands::exec::run_exec(&cwd, args, cli.verbose, cli.json),
        Command::Vocab => commands::vocab::run_vocab(cli.json),
    }
}
