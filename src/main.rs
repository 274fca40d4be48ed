mod cli;
mod commands;
mod compiler;
mod config;
mod platform;
mod progress;
mod schema;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match run(&ctx, cli.command) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::from(2)
        }
    }
}

/// Dispatch a subcommand; `Ok` carries the process exit status
fn run(ctx: &Context, command: Command) -> Result<i32> {
    match command {
        Command::Compile(args) => commands::catalog::compile(ctx, args),
        Command::Graph(args) => commands::catalog::graph(args),
        Command::Plan(args) => commands::converge::plan(ctx, args),
        Command::Apply(args) => commands::converge::apply(ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ds389", &mut io::stdout());
            Ok(0)
        }
    }
}
