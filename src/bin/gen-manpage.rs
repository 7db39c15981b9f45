//! Man page generator for droidflash
//!
//! Writes `droidflash.1` plus one `droidflash-<command>.1` page per
//! subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::{Command, CommandFactory};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: Command, path: &Path) -> io::Result<()> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    fs::write(path, buffer)?;
    println!("  {}", path.display());
    Ok(())
}

fn main() -> io::Result<()> {
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let mut cmd = cli::Cli::command();
    // Propagates global flags (-v, --config, --simulate) into the subcommands
    cmd.build();

    println!("Generated man pages:");
    let main_page = output_dir.join("droidflash.1");
    render(cmd.clone(), &main_page)?;

    for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
        let title = format!("droidflash-{}", sub.get_name());
        let page = output_dir.join(format!("{}.1", title));
        let sub = sub.clone().display_name(title);
        render(sub, &page)?;
    }

    println!("\nView with: man -l {}", main_page.display());
    Ok(())
}
