use std::fmt::Write as _;
use std::path::Path;

use autofetch_core::{Abort, ItemReport, Outcome, RunReport, Tally};

/// One progress line per processed address.
pub fn item_line(item: &ItemReport) -> String {
    let status = match &item.outcome {
        Outcome::Skipped { existing } => format!("skipped (already have {existing})"),
        Outcome::Succeeded { filename } => format!("downloaded {filename}"),
        Outcome::Failed { reason, .. } => format!("failed: {reason}"),
    };
    format!("[{}/{}] {}: {status}", item.index, item.total, item.label)
}

/// Final summary table followed by the download directory.
pub fn render(report: &RunReport, download_dir: &Path) -> String {
    let tally = report.tally;
    let total = tally.total();
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:>6} {:>8}", "Result", "Count", "Share");
    let rows = [
        ("Succeeded", tally.succeeded),
        ("Skipped", tally.skipped),
        ("Failed", tally.failed),
        ("Available", tally.available()),
    ];
    for (label, count) in rows {
        let _ = writeln!(
            out,
            "{:<12} {:>6} {:>7.1}%",
            label,
            count,
            Tally::percent(count, total)
        );
    }
    let _ = writeln!(out, "{:<12} {:>6}", "Processed", total);
    if total < report.planned {
        let _ = writeln!(out, "{:<12} {:>6}", "Not reached", report.planned - total);
    }
    match &report.aborted {
        Some(Abort::Cancelled) => {
            let _ = writeln!(out, "Run cancelled before all addresses were processed.");
        }
        Some(Abort::SessionEstablish(reason)) => {
            let _ = writeln!(out, "Run aborted: could not start a browser session ({reason}).");
        }
        None => {}
    }
    let _ = write!(out, "Downloads: {}", download_dir.display());
    out
}
