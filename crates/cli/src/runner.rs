//! Regeneration by running an external command

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use regen_trigger::{Regenerate, SourceId};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, ExitStatus};
use std::time::Instant;
use tracing::{info, warn};

/// Environment variable holding the changed sources, one per line
pub const SOURCES_ENV: &str = "REGEN_SOURCES";

/// Runs the user's command once per batch of changed sources
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
}

impl CommandRunner {
    /// Build from `program arg...`
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("No command given to run on change")?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Run the command to completion with `REGEN_SOURCES` set
    pub fn run(&self, sources: &HashSet<SourceId>) -> Result<ExitStatus> {
        let mut sorted: Vec<&str> = sources.iter().map(String::as_str).collect();
        sorted.sort_unstable();

        Command::new(&self.program)
            .args(&self.args)
            .env(SOURCES_ENV, sorted.join("\n"))
            .status()
            .with_context(|| format!("Failed to run `{}`", self.describe()))
    }

    /// Command line as typed
    pub fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Regenerate for CommandRunner {
    fn regenerate(&self, sources: HashSet<SourceId>) {
        let noun = if sources.len() == 1 { "source" } else { "sources" };
        report(
            io::stdout().lock(),
            format_args!(
                "{} {} {} changed, running {}",
                "↻".cyan(),
                sources.len(),
                noun,
                self.describe().bold()
            ),
        );

        let started = Instant::now();
        match self.run(&sources) {
            Ok(status) if status.success() => {
                info!("Regeneration finished in {:?}", started.elapsed());
            }
            Ok(status) => {
                warn!("`{}` exited with {}", self.describe(), status);
                report(io::stdout().lock(), format_args!("{} {}", "✗".red(), status));
            }
            Err(e) => warn!("{:#}", e),
        }
    }
}

/// Print one status line; a closed stdout (`regen ... | head`) is not an error
fn report<W: Write>(mut out: W, line: fmt::Arguments<'_>) {
    match writeln!(out, "{}", line) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => warn!("Failed to write status: {}", e),
    }
}
