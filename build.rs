//! Build script generating a manual page from the CLI definition.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let man = Man::new(cli::Cli::command());
    let mut rendered = Vec::new();
    man.render(&mut rendered)?;
    fs::write(out_dir.join("weir.1"), rendered)?;
    Ok(())
}
