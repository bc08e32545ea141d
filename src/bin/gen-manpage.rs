//! Writes ck590.1 and one page per subcommand (ck590-serve.1, ...)
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, dir: &Path, stem: &str) -> std::io::Result<PathBuf> {
    let mut page = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut page)?;
    let path = dir.join(format!("{}.1", stem));
    std::fs::write(&path, page)?;
    Ok(path)
}

fn main() -> std::io::Result<()> {
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    std::fs::create_dir_all(&dir)?;

    let cmd = cli::Cli::command();
    let mut written = vec![render(cmd.clone(), &dir, "ck590")?];
    for sub in cmd.get_subcommands() {
        let stem = format!("ck590-{}", sub.get_name());
        written.push(render(sub.clone(), &dir, &stem)?);
    }

    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
