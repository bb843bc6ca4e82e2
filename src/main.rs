// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! modload - an asynchronous, AMD-style module loader
//!
//! This is the main entry point for the modload CLI/REPL.
//!
//! ## Features
//!
//! - Load JSON modules and their dependencies from a directory
//! - Inspect the state of every module a load touched
//! - Interactive REPL for defining and requiring modules

mod cli;
mod commands;
mod repl;

use clap::Parser;
use cli::{Cli, Commands};
use modload_core::LoaderConfig;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tokio::runtime::{Handle, Runtime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return report(e),
    };

    init_tracing(&config, cli.verbose);

    // The REPL blocks on this runtime from the main thread, so it is built
    // by hand rather than through #[tokio::main].
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => return report(e.into()),
    };

    let result = match cli.command {
        Some(Commands::Run(args)) => {
            let loader = commands::build_loader(config);
            runtime.block_on(commands::run(&args, &loader))
        }
        Some(Commands::Graph(args)) => {
            let loader = commands::build_loader(config);
            runtime.block_on(commands::graph(&args, &loader))
        }
        Some(Commands::Repl) | None => run_repl(config, runtime.handle().clone()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(e),
    }
}

/// Config file and environment, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<LoaderConfig> {
    let mut config = LoaderConfig::load(cli.config.as_deref())?;
    if let Some(base_dir) = &cli.base_dir {
        config.base_dir = base_dir.clone();
    }
    if let Some(retries) = cli.retries {
        config.fetch_retries = retries;
    }
    Ok(config)
}

fn init_tracing(config: &LoaderConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.loglevel.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Start the interactive REPL
fn run_repl(config: LoaderConfig, handle: Handle) -> anyhow::Result<()> {
    let loader = commands::build_loader(config);
    let mut repl = repl::Repl::new(loader, handle)?;
    repl.run()?;
    Ok(())
}

fn report(error: anyhow::Error) -> ExitCode {
    eprintln!("{}: {:#}", "Error".red().bold(), error);
    ExitCode::FAILURE
}
