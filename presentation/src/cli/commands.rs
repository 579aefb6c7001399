//! CLI command definitions

use clap::{Parser, ValueEnum};
use conclave_domain::OutputFormat;
use std::path::PathBuf;

/// Output format of the final result
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    /// The tagged output block only
    Text,
    /// Output, per-task reports and auxiliary results as JSON
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

/// CLI arguments for conclave
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(
    author,
    version,
    about = "Selective multi-endpoint orchestration with cabinet deliberation"
)]
#[command(long_about = r#"
Conclave sends one user turn to every bound endpoint/prompt pair concurrently,
optionally lets a cabinet of endpoints draft, review and merge, runs the
auxiliary modules (optimization, plot directive, memory) alongside, and
prints one tagged output block.

Configuration files are loaded from (in priority order):
1. --config <path>                    Explicit config file
2. ./conclave.toml                    Project-level config
3. ~/.config/conclave/config.toml     Global config

Press Ctrl-C once to cancel every in-flight call.

Example:
  conclave "The party reaches the river crossing."
  echo "Describe the town" | conclave --context "$(cat recap.txt)"
  conclave --repair-bindings
"#)]
pub struct Cli {
    /// The user turn. Read from stdin when omitted.
    pub input: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding `<name>.json` worldbooks (overrides the config file)
    #[arg(long, value_name = "DIR")]
    pub worldbooks: Option<PathBuf>,

    /// Conversation context passed to templates as `{context}`
    #[arg(long, value_name = "TEXT")]
    pub context: Option<String>,

    /// Maximum concurrent AI calls (0 = unbounded)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Output format (defaults to the config file's, then text)
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormatArg>,

    /// Repair stale endpoint bindings in the config file, then exit
    #[arg(long)]
    pub repair_bindings: bool,

    /// Append structured run events (JSONL) to this file
    #[arg(long, value_name = "PATH")]
    pub run_log: Option<PathBuf>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "conclave",
            "--config",
            "c.toml",
            "--worldbooks",
            "books",
            "--concurrency",
            "2",
            "-o",
            "json",
            "--run-log",
            "run.jsonl",
            "-vv",
            "hello",
        ])
        .unwrap();
        assert_eq!(cli.input.as_deref(), Some("hello"));
        assert_eq!(cli.concurrency, Some(2));
        assert_eq!(cli.output, Some(OutputFormatArg::Json));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.worldbooks, Some(PathBuf::from("books")));
        assert!(!cli.repair_bindings);
    }

    #[test]
    fn test_input_is_optional() {
        let cli = Cli::try_parse_from(["conclave", "--repair-bindings", "-q"]).unwrap();
        assert!(cli.input.is_none());
        assert!(cli.repair_bindings);
        assert!(cli.quiet);
    }

    #[test]
    fn test_output_arg_converts() {
        assert_eq!(OutputFormat::from(OutputFormatArg::Json), OutputFormat::Json);
        assert_eq!(OutputFormat::from(OutputFormatArg::Text), OutputFormat::Text);
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
