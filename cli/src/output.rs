//! Output formatting utilities for CLI commands

use colored::Colorize;
use covfetch_client::RetrieveOutcome;
use covfetch_store::StoreSummary;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

pub fn print_outcome(outcome: &RetrieveOutcome) {
    success(&format!(
        "Retrieved {} units from {} sessions into {}",
        outcome.units_fetched,
        outcome.sessions_fetched,
        outcome.destination.display()
    ));
    if outcome.reset_acknowledged {
        println!("  Agent counters reset");
    }
    print_store(&outcome.store);
}

pub fn print_store(summary: &StoreSummary) {
    println!(
        "  Units:    {} ({} new, {} merged)",
        summary.units, summary.merge.units_added, summary.merge.units_merged
    );
    println!(
        "  Sessions: {} ({} new)",
        summary.sessions, summary.merge.sessions_added
    );
    println!(
        "  Probes:   {}/{} covered ({})",
        summary.covered_probes,
        summary.total_probes,
        percent(summary.covered_probes, summary.total_probes)
    );
}

fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}
