//! Console output formatter
//!
//! The tagged output block goes to stdout untouched so it can be piped. The
//! run summary (task outcomes, auxiliary modules, config warnings) is meant
//! for stderr.

use colored::Colorize;
use conclave_application::{PrimaryMode, SelectiveOutput};
use conclave_domain::{AssemblyNote, ConfigIssue, OutputFormat, TaskOutcome};

/// Formats selective-mode results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format the result in the requested format.
    pub fn format(result: &SelectiveOutput, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => Self::format_text(result),
            OutputFormat::Json => Self::format_json(result),
        }
    }

    /// The tagged output block only
    pub fn format_text(result: &SelectiveOutput) -> String {
        result.output.clone()
    }

    /// Format as JSON
    pub fn format_json(result: &SelectiveOutput) -> String {
        serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
    }

    /// Human-readable run summary
    pub fn format_summary(result: &SelectiveOutput) -> String {
        let mut output = String::new();

        let mode = match result.mode {
            PrimaryMode::FanOut => "fan-out",
            PrimaryMode::Cabinet => "cabinet",
            PrimaryMode::Standalone => "auxiliary only",
        };
        output.push_str(&format!("{} {}", "Mode:".cyan().bold(), mode));
        if result.aggregated {
            output.push_str(&format!(" {}", "(aggregated)".dimmed()));
        }
        output.push('\n');

        for report in &result.reports {
            let line = match &report.outcome {
                TaskOutcome::Completed(_) => format!("  {} {}", "v".green(), report.display_name),
                TaskOutcome::Failed(reason) => format!(
                    "  {} {}: {}",
                    "x".red(),
                    report.display_name,
                    reason.dimmed()
                ),
                TaskOutcome::Aborted => format!(
                    "  {} {} {}",
                    "-".magenta(),
                    report.display_name,
                    "(aborted)".dimmed()
                ),
            };
            output.push_str(&line);
            if report.dropped_chunks > 0 {
                output.push_str(&format!(
                    " {}",
                    format!("[{} chunk(s) dropped]", report.dropped_chunks).yellow()
                ));
            }
            output.push('\n');
        }

        for aux in &result.auxiliary {
            let state = if aux.text.trim().is_empty() {
                "empty".dimmed()
            } else {
                "ok".green()
            };
            output.push_str(&format!("  {} {}\n", aux.kind.as_str().bold(), state));
        }

        for note in &result.notes {
            let text = match note {
                AssemblyNote::EchoedPlotDirective => {
                    "plot directive echoed its input and was dropped"
                }
            };
            output.push_str(&format!("  {} {}\n", "note:".dimmed(), text));
        }

        output.push_str(&Self::format_issues(&result.issues));
        output
    }

    /// One line per configuration issue, errors in red
    pub fn format_issues(issues: &[ConfigIssue]) -> String {
        issues
            .iter()
            .map(|issue| {
                if issue.is_error() {
                    format!("{} {}\n", "error:".red().bold(), issue.message)
                } else {
                    format!("{} {}\n", "warning:".yellow().bold(), issue.message)
                }
            })
            .collect()
    }
}
