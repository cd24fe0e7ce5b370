use std::io::{self, Write};

use serde::Serialize;
use tracing::debug;

use crate::app::{CategoryStats, ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::write_summary(&mut io::stdout().lock(), summary)
    }

    pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
        writeln!(
            out,
            "{:<24} {:>10} {:>8} {:>10} {:>8} {:>8}",
            "category", "downloaded", "skipped", "duplicates", "blocked", "filtered"
        )?;
        for stats in &summary.categories {
            write_row(out, stats)?;
        }
        write_row(out, &summary.totals)?;
        for unknown in &summary.unknown_categories {
            writeln!(out, "unknown category: {unknown}")?;
        }
        if summary.interrupted {
            writeln!(out, "run interrupted; progress so far was saved")?;
        }
        if !summary.ledger_saved {
            writeln!(out, "warning: the ledger could not be saved, see the log")?;
        }
        writeln!(out, "images saved to {}", summary.output_dir)?;
        Ok(())
    }
}

fn write_row<W: Write>(out: &mut W, stats: &CategoryStats) -> io::Result<()> {
    writeln!(
        out,
        "{:<24} {:>10} {:>8} {:>10} {:>8} {:>8}",
        stats.category,
        stats.downloaded,
        stats.skipped,
        stats.duplicates,
        stats.blocked,
        stats.non_histology
    )
}

/// Forwards progress events to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => debug!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => debug!("{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_summary_lists_categories_and_totals() {
        let stats = CategoryStats {
            category: "sarcoidosis".to_string(),
            downloaded: 4,
            skipped: 1,
            ..CategoryStats::default()
        };
        let summary = RunSummary {
            profile: "disease".to_string(),
            output_dir: "out".to_string(),
            categories: vec![stats.clone()],
            unknown_categories: vec!["lupus".to_string()],
            totals: CategoryStats {
                category: "total".to_string(),
                ..stats
            },
            interrupted: true,
            ledger_saved: true,
        };

        let mut buffer = Vec::new();
        TextOutput::write_summary(&mut buffer, &summary).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("sarcoidosis"));
        assert!(text.lines().any(|line| line.starts_with("total")));
        assert!(text.contains("unknown category: lupus"));
        assert!(text.contains("interrupted"));
    }
}
