use anyhow::Result;
use blockwatch::cli::{Cli, Commands};
use blockwatch::output::{self, Verbosity};
use blockwatch::{BlockwatchContext, commands};
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        output::error(&format!("Error: {e:#}"));
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("BLOCKWATCH_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    if cli.quiet {
        output::set_verbosity(Verbosity::Quiet);
    } else if cli.verbose {
        output::set_verbosity(Verbosity::Verbose);
    }

    if let Commands::Completion { shell } = &cli.command {
        let mut cmd = Cli::command();
        print_completions(*shell, &mut cmd);
        return Ok(());
    }

    let mut ctx = BlockwatchContext::new()?;

    match cli.command {
        Commands::Run {
            world,
            period,
            watch,
            force,
        } => {
            commands::run::execute(&ctx, &world, period, watch, force)?;
        }
        Commands::Notify {
            world,
            replay,
            force,
        } => {
            commands::notify::execute(&ctx, &world, replay, force)?;
        }
        Commands::Tree {
            world,
            replay,
            force,
        } => {
            commands::tree::execute(&ctx, &world, replay, force)?;
        }
        Commands::Trackers {
            world,
            replay,
            force,
        } => {
            commands::trackers::execute(&ctx, &world, replay, force)?;
        }
        Commands::Groups => commands::groups::execute(&ctx),
        Commands::Rules { group } => commands::groups::execute_rules(&ctx, &group),
        Commands::Config {
            key,
            value,
            unset,
            list,
        } => {
            commands::config::execute(&mut ctx, key.as_deref(), value.as_deref(), unset, list)?;
        }
        Commands::Completion { .. } => {}
    }

    Ok(())
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
