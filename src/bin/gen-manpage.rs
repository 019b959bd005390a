//! Man page generator for iotprov
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]
//!
//! Writes `iotprov.1` plus one page per subcommand group.

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, path: &Path) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    fs::write(path, buffer)?;
    println!("Man page generated at: {}", path.display());
    Ok(())
}

fn main() -> std::io::Result<()> {
    // Default to ./man directory
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    for sub in cmd.get_subcommands() {
        let page = output_dir.join(format!("iotprov-{}.1", sub.get_name()));
        render(sub.clone(), &page)?;
    }

    let main_page = output_dir.join("iotprov.1");
    render(cmd, &main_page)?;

    println!("\nTo view the man page:");
    println!("  man -l {}", main_page.display());

    Ok(())
}
