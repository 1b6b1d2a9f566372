// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use cmd::commands::{
    cat_command, list_command, mkdir_command, remove_command, replicate_demo, shell_command,
    transfer_command,
};
use cmd::common::Workspace;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "vcomp")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Home directory holding the disks (overrides VCOMP_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Configuration file (defaults to <home>/vcomp.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the script shell, interactive unless a script or commands are given
    Shell {
        /// Run these lines in order and exit
        #[arg(short = 'c', long = "command")]
        commands: Vec<String>,

        /// Script to run, relative to the shell's current directory
        script: Option<String>,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file
    Cat { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or empty directory
    Rm { path: String },
    /// Copy a file or directory tree
    Cp {
        source: String,
        dest: String,

        /// Replace an existing destination
        #[arg(long)]
        overwrite: bool,
    },
    /// Move a file or directory tree
    Mv {
        source: String,
        dest: String,

        #[arg(long)]
        overwrite: bool,
    },
    /// Replicate a peer's disks through an in-process host
    ReplicateDemo,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let ws = Workspace::open(cli.home, cli.config)?;

    match &cli.command {
        Commands::Shell { commands, script } => {
            shell_command(&ws, commands, script.as_deref()).await
        }
        Commands::Ls { path } => {
            let registry = ws.registry()?;
            list_command(&registry, &ws.virtual_path(path)?, &mut std::io::stdout().lock())
        }
        Commands::Cat { path } => {
            let registry = ws.registry()?;
            let mut stdout = std::io::stdout().lock();
            cat_command(&registry, &ws.virtual_path(path)?, &mut stdout)?;
            stdout.flush()?;
            Ok(())
        }
        Commands::Mkdir { path } => mkdir_command(&*ws.registry()?, &ws.virtual_path(path)?),
        Commands::Rm { path } => remove_command(&*ws.registry()?, &ws.virtual_path(path)?),
        Commands::Cp {
            source,
            dest,
            overwrite,
        } => transfer_command(
            &*ws.registry()?,
            &ws.virtual_path(source)?,
            &ws.virtual_path(dest)?,
            false,
            *overwrite,
        ),
        Commands::Mv {
            source,
            dest,
            overwrite,
        } => transfer_command(
            &*ws.registry()?,
            &ws.virtual_path(source)?,
            &ws.virtual_path(dest)?,
            true,
            *overwrite,
        ),
        Commands::ReplicateDemo => replicate_demo(&ws, &mut std::io::stdout().lock()),
    }
}
