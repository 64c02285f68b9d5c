// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `lavisd` command-line surface: a single long-running daemon plus a
//! handful of operational subcommands, grounded on the teacher's own
//! `clap`-derive style (`Cli`/`Commands` with `#[command(subcommand)]`,
//! a `Completions` subcommand generating shell completions via
//! `clap_complete`) but stripped to what a service binary needs rather
//! than the teacher's single-shot coding-agent invocation surface.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser, Debug)]
#[command(name = "lavisd", version, about = "Lavis desktop-assistant backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to an explicit config file, overriding the usual search path.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP/WebSocket server (default when no subcommand is given).
    Serve,
    /// Print the fully resolved configuration (defaults merged with any
    /// config files found) as YAML.
    ShowConfig,
    /// Generate shell completion scripts for `lavisd`.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
