//! tally CLI: word-count statistics for markdown vaults
//!
//! Commands: scan, tree, stats, update, watch, goal, title, policy,
//! project, completions

mod cli;
mod commands;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::Level;

use cli::{Cli, Commands};

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let vault = cli.vault.as_path();

    match &cli.command {
        Commands::Scan(args) => commands::scan(vault, args),
        Commands::Tree(args) => commands::tree(vault, args),
        Commands::Stats(args) => commands::stats(vault, args),
        Commands::Update(args) => commands::update(vault, args),
        Commands::Watch(args) => commands::watch(vault, args),
        Commands::Goal(args) => commands::goal(vault, args),
        Commands::Title(args) => commands::title(vault, args),
        Commands::Policy(args) => commands::policy(vault, args),
        Commands::Project(command) => commands::project(vault, command),
        Commands::Completions(args) => {
            clap_complete::generate(args.shell, &mut Cli::command(), "tally", &mut io::stdout());
            Ok(())
        }
    }
}
