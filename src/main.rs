//! # orion
//!
//! **orion** sets up notebook workspaces.
//!
//! Features:
//! - `orion express` clones (or refreshes) a registry repository and starts a session branch
//! - `orion setup clone` clones any repository into a directory of your choice
//! - `orion setup existing` provisions a folder you already have
//! - `orion status` shows which registry repositories are on disk
//! - `orion launch` reopens the last workspace
//! - `orion home` prints the orion home directory
//!
//! Every setup finishes by making sure pixi is installed and running
//! `pixi install` in the workspace. Add `--emit-script` to print a bash
//! script for a remote host instead of running locally.
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use orion::env::SystemEnv;
use orion::{
    CloneArgs, RunOptions, cmd_express, cmd_launch, cmd_setup_clone, cmd_setup_existing,
    cmd_status, logging, orion_home,
};

/// Command-line interface definition.
///
/// Parsed using `clap` derive macros.
#[derive(Parser, Debug)]
#[command(
    name = "orion",
    version,
    about = "orion - notebook workspace setup",
    arg_required_else_help = true
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); ORION_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// One-step setup of a registry repository on a fresh session branch
    Express {
        /// Registry id (defaults to the first entry)
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        run: RunFlags,
    },
    /// Set up a workspace step by step
    Setup {
        #[command(subcommand)]
        mode: SetupCmd,
    },
    /// Show registry repositories and whether they are on disk
    Status,
    /// Reopen the last workspace, or show what can be set up
    Launch {
        /// Only print the directory, do not run the open command
        #[arg(long)]
        no_open: bool,
    },
    /// Print the orion home directory
    Home,
}

#[derive(Subcommand, Debug)]
enum SetupCmd {
    /// Use a directory that already exists
    Existing {
        dir: PathBuf,
        #[command(flatten)]
        run: RunFlags,
    },
    /// Clone a repository, then provision it
    Clone {
        /// Registry id to clone
        #[arg(long, conflicts_with = "url")]
        repo: Option<String>,
        /// Any git URL; needs --target
        #[arg(long, requires = "target")]
        url: Option<String>,
        /// Directory to clone into (defaults to the registry entry's)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Branch to create, or switch to if it exists
        #[arg(long)]
        branch: Option<String>,
        /// Fetch only the latest commit
        #[arg(long)]
        shallow: bool,
        #[command(flatten)]
        run: RunFlags,
    },
}

#[derive(Args, Debug)]
struct RunFlags {
    /// Do not run the configured open command afterwards
    #[arg(long)]
    no_open: bool,
    /// Print a bash script for a remote host instead of running locally
    #[arg(long)]
    emit_script: bool,
}

impl From<RunFlags> for RunOptions {
    fn from(f: RunFlags) -> Self {
        RunOptions {
            open: !f.no_open,
            emit_script: f.emit_script,
        }
    }
}

fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Express { repo, run } => cmd_express(repo.as_deref(), run.into()),
        Cmd::Setup { mode } => match mode {
            SetupCmd::Existing { dir, run } => cmd_setup_existing(&dir, run.into()),
            SetupCmd::Clone {
                repo,
                url,
                target,
                branch,
                shallow,
                run,
            } => cmd_setup_clone(
                CloneArgs {
                    repo,
                    url,
                    target,
                    branch,
                    shallow,
                },
                run.into(),
            ),
        },
        Cmd::Status => cmd_status(),
        Cmd::Launch { no_open } => cmd_launch(!no_open),
        Cmd::Home => {
            println!("{}", orion_home(&SystemEnv)?.display());
            Ok(())
        }
    }
}

/// CLI entry point.
///
/// Parses arguments with `clap`, sets up logging and executes the selected
/// subcommand. Errors are printed once, with their causes, on stderr.
fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let Some(cmd) = cli.cmd else {
        return;
    };
    if let Err(e) = run(cmd) {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
