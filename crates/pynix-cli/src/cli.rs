//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pynix",
    version,
    about = "Resolve Python requirements into a reproducible package graph",
    long_about = "pynix resolves Python requirements against wheel, sdist, nixpkgs, conda \
                  and platform package metadata for one target platform, and prints the \
                  cycle-free set of packages a build recipe needs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve requirements and print the resolved packages as JSON
    Resolve {
        /// Configuration file (defaults to ./pynix.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Read requirements from a file, one per line
        #[arg(short, long)]
        requirements: Option<PathBuf>,
        /// Requirement lines, e.g. "requests[socks]>=2.24"
        reqs: Vec<String>,
        /// Print the dependency tree instead of JSON
        #[arg(long)]
        tree: bool,
        /// Write the JSON result to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse requirement lines and print them normalized
    Parse {
        /// Requirement lines
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
