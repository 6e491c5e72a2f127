//! Build automation for blockwatch: man pages and shell completions.

use anyhow::{Context, Result};
use clap::{Command, CommandFactory, Parser};
use clap_complete::Shell;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Subcommands that get a page of their own
const PAGED_SUBCOMMANDS: [&str; 5] = ["run", "notify", "tree", "trackers", "config"];

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for blockwatch")]
enum Task {
    /// Generate man pages from clap definitions
    GenerateManPages {
        /// Output directory for man pages
        #[arg(short, long, default_value = "man")]
        output: PathBuf,
    },
    /// Generate completion scripts for every supported shell
    GenerateCompletions {
        /// Output directory for completion scripts
        #[arg(short, long, default_value = "completions")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    match Task::parse() {
        Task::GenerateManPages { output } => generate_man_pages(&output),
        Task::GenerateCompletions { output } => generate_completions(&output),
    }
}

fn create_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))
}

fn render_page(cmd: Command, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create man page: {}", path.display()))?;
    clap_mangen::Man::new(cmd).render(&mut BufWriter::new(file))?;
    println!("✓ Generated: {}", path.display());
    Ok(())
}

fn generate_man_pages(output_dir: &Path) -> Result<()> {
    create_output_dir(output_dir)?;

    let cmd = blockwatch::cli::Cli::command();
    render_page(cmd.clone(), &output_dir.join("blockwatch.1"))?;

    for name in PAGED_SUBCOMMANDS {
        let Some(sub) = cmd.find_subcommand(name) else {
            continue;
        };
        render_page(sub.clone(), &output_dir.join(format!("blockwatch-{name}.1")))?;
    }

    println!("\nTo view: man {}/blockwatch.1", output_dir.display());
    Ok(())
}

fn generate_completions(output_dir: &Path) -> Result<()> {
    create_output_dir(output_dir)?;

    let mut cmd = blockwatch::cli::Cli::command();
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::Elvish, Shell::PowerShell] {
        let path = clap_complete::generate_to(shell, &mut cmd, "blockwatch", output_dir)
            .with_context(|| format!("Failed to write {shell} completions"))?;
        println!("✓ Generated: {}", path.display());
    }
    Ok(())
}
