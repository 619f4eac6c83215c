//! Command dispatch and handler modules.

mod parse;
mod resolve;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Resolve {
            config,
            requirements,
            reqs,
            tree,
            output,
        } => resolve::exec(
            config.as_deref(),
            requirements.as_deref(),
            &reqs,
            tree,
            output.as_deref(),
        ),
        Command::Parse { lines } => parse::exec(&lines),
    }
}
