// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CLI argument parsing for modload.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// modload - load JSON modules and their dependencies, AMD style
#[derive(Parser, Debug)]
#[command(name = "modload")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (default: ./modload.toml)
    #[arg(short, long, global = true, env = "MODLOAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory containing the JSON modules
    #[arg(short, long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Extra fetch attempts after a read failure
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load modules and print their exports
    #[command(alias = "require")]
    Run(LoadArgs),

    /// Load modules and print the state of every module touched
    #[command(alias = "ls")]
    Graph(LoadArgs),

    /// Start the interactive REPL
    Repl,
}

/// Arguments for commands that load modules
#[derive(Args, Debug, Default)]
pub struct LoadArgs {
    /// Module names to require
    #[arg(required = true)]
    pub modules: Vec<String>,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["modload", "--base-dir", "mods", "run", "a", "b"]);
        assert_eq!(cli.base_dir, Some(PathBuf::from("mods")));
        match cli.command {
            Some(Commands::Run(args)) => assert_eq!(args.modules, vec!["a", "b"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
