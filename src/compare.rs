//! Buffered versus unbuffered comparison
//!
//! Runs the same `SELECT *` once per policy, each on its own connection,
//! writes every row, and reports how long each mode took. Failures are turned
//! into a printed diagnostic for that mode; the comparison always carries on.

use crate::config::{Config, OutputFormat};
use crate::core::db::{BufferingPolicy, Connection, Query, Row};
use crate::core::{Result, RowStreamError};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Modes in the order they are run
pub const MODES: [BufferingPolicy; 2] = [BufferingPolicy::Unbuffered, BufferingPolicy::Buffered];

/// Outcome of one timed mode
#[derive(Debug)]
pub struct ModeReport {
    pub policy: BufferingPolicy,
    pub elapsed: Duration,
    /// Rows written before the mode finished or failed
    pub rows: usize,
    pub error: Option<RowStreamError>,
}

impl ModeReport {
    pub fn timing_line(&self) -> String {
        format!(
            "Total execution time for {}: {} seconds",
            self.policy,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Opens a connection, streams the configured table under `policy`, and
/// writes each row to `out`. Returns the number of rows written.
pub fn fetch_and_print<W: Write>(config: &Config, policy: BufferingPolicy, out: &mut W) -> Result<usize> {
    let mut written = 0;
    fetch_rows(config, policy, out, &mut written)?;
    Ok(written)
}

fn fetch_rows<W: Write>(config: &Config, policy: BufferingPolicy, out: &mut W, written: &mut usize) -> Result<()> {
    let conn = Connection::open(&config.connection_options())?;
    let query = Query::select_all(&config.table)?;
    for row in conn.stream(&query, policy)? {
        write_row(&row?, config.output, out)?;
        *written += 1;
    }
    Ok(())
}

/// Writes one row in the configured output format.
pub fn write_row<W: Write>(row: &Row, format: OutputFormat, out: &mut W) -> Result<()> {
    match format {
        OutputFormat::Text => write!(out, "{}", row.dump())?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, row)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Times one mode. Errors are written to `out` as a diagnostic, never returned.
pub fn run_mode<W: Write>(config: &Config, policy: BufferingPolicy, out: &mut W) -> ModeReport {
    info!("Fetching {} result from {}", policy, config.endpoint);
    let start = Instant::now();
    let mut rows = 0;
    let outcome = fetch_rows(config, policy, out, &mut rows);
    let elapsed = start.elapsed();

    let error = match outcome {
        Ok(()) => None,
        Err(e) => {
            error!("{} fetch failed: {}", policy, e);
            if let Err(write_err) = writeln!(out, "{} fetch failed: {}", capitalize(policy.label()), e) {
                warn!("Failed to write diagnostic: {}", write_err);
            }
            Some(e)
        }
    };

    ModeReport {
        policy,
        elapsed,
        rows,
        error,
    }
}

/// Runs every mode in [`MODES`] and then writes one timing line per mode.
///
/// # Errors
///
/// Only fails if the timing lines cannot be written.
pub fn run_comparison<W: Write>(config: &Config, out: &mut W) -> Result<Vec<ModeReport>> {
    let reports: Vec<ModeReport> = MODES.iter().map(|&policy| run_mode(config, policy, out)).collect();
    for report in &reports {
        writeln!(out, "{}", report.timing_line())?;
    }
    out.flush()?;
    Ok(reports)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
