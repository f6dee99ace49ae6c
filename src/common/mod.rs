//! Common functionality.

use std::path::Path;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!("RSS now: {}", bytesize::ByteSize::b(rss)),
        Err(e) => tracing::debug!("could not determine RSS: {}", e),
    }
}

/// Parse a list of identifiers given on the command line.
///
/// If `value` names an existing file, the identifiers are read from that
/// file (separated by newlines, commas, or whitespace; `#` starts a comment
/// line).  Otherwise, `value` is split at commas.  Empty entries are dropped
/// in both cases.
pub fn parse_id_list(value: &str) -> Result<Vec<String>, anyhow::Error> {
    let path = Path::new(value);
    if path.is_file() {
        tracing::debug!("reading identifier list from {:?}", path);
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("problem reading {:?}: {}", path, e))?;
        Ok(contents
            .lines()
            .filter(|line| !line.starts_with('#'))
            .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    } else {
        Ok(value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }
}
