use anyhow::{Context, Result};
use colored::*;
use ctxpack_core::RepoRef;
use std::io::{self, Write};

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.is_empty() && !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Batch outcome on stderr so stdout carries only reports.
pub fn print_batch_summary(succeeded: &[RepoRef], failed: &[(RepoRef, String)], quiet: bool) {
    if quiet {
        return;
    }
    eprintln!(
        "{} {} fetched, {} failed",
        "Batch:".green().bold(),
        succeeded.len().to_string().cyan(),
        failed.len().to_string().cyan()
    );
    for (repo, reason) in failed {
        eprintln!("  {} {}: {}", "x".red(), repo.to_string().yellow(), reason);
    }
}
