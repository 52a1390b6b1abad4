use crate::ingest::LogFormat;
use crate::rule::RuleStatus;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    Text,
    /// JSON output for shells and scripts
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect color support (default)
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Offline detection engine for JSON event logs (CloudTrail and flat/NDJSON)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "trailscan")]
#[command(after_help = "CONDITION SYNTAX:
  path <op> literal, combined with AND / OR / NOT and parentheses.

  Paths are dotted with optional indices: userIdentity.type, resources[0].ARN
  Operators:
    = != <> < <= > >=                     comparisons
    IN (...), NOT IN (...)                membership
    CONTAINS, STARTSWITH, ENDSWITH        substring tests (NOT-prefixable)
    MATCH 'pat'                           wildcards: * any run, ? one char
    LIKE 'pat'                            SQL wildcards: % and _
    IS NULL, IS NOT NULL                  null / presence test

  A field that is absent from a record satisfies nothing except IS NULL.
  Examples:
    \"eventName = 'ConsoleLogin' AND errorCode IS NULL\"
    \"errorCode IN ('AccessDenied', 'UnauthorizedOperation')\"
    \"userAgent NOT CONTAINS 'aws-sdk' AND sourceIPAddress MATCH '203.0.*'\"")]
pub struct Cli {
    /// Data directory (rules/, logs/, config.json)
    #[arg(
        long,
        global = true,
        env = "TRAILSCAN_DATA_DIR",
        default_value = ".trailscan"
    )]
    pub data_dir: PathBuf,

    /// Output format (text or json)
    #[arg(short = 'F', long, value_enum, default_value_t = OutputFormat::Text, global = true, env = "TRAILSCAN_FORMAT")]
    pub format: OutputFormat,

    /// Path to a file to also write the results to
    #[arg(short, long, global = true, env = "TRAILSCAN_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true, env = "TRAILSCAN_COLOR")]
    pub color: ColorMode,

    /// Increase verbosity level (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRAILSCAN_VERBOSE")]
    pub verbose: u8,

    /// Be quiet, show only errors
    #[arg(
        short,
        long,
        global = true,
        env = "TRAILSCAN_QUIET",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all rules in the store
    #[command(alias = "rules")]
    ListRules {
        /// Only show rules with this status
        #[arg(long, value_enum)]
        status: Option<RuleStatus>,
    },

    /// Print one rule as YAML
    GetRule {
        /// Rule id
        rule_id: String,
    },

    /// Save (create or overwrite) a rule from a YAML file
    SaveRule {
        /// Rule YAML file
        file: PathBuf,
    },

    /// Delete a rule from the store
    DeleteRule {
        /// Rule id
        rule_id: String,
    },

    /// Export one rule's canonical YAML to a file
    ExportRule {
        /// Rule id
        rule_id: String,

        /// Destination file
        dest_path: PathBuf,
    },

    /// Export every rule into a ZIP archive
    ExportAllRules {
        /// Destination archive path
        dest_path: PathBuf,
    },

    /// Import a single rule file
    ImportRule {
        /// Rule YAML file
        source_path: PathBuf,

        /// Replace an existing rule with the same id
        #[arg(long)]
        overwrite: bool,
    },

    /// Import a batch of rule files
    ImportRules {
        /// Rule YAML files
        #[arg(required = true, num_args = 1..)]
        file_paths: Vec<PathBuf>,

        /// Replace existing rules with matching ids
        #[arg(long)]
        overwrite: bool,
    },

    /// Import every rule inside a ZIP archive
    ImportRulesZip {
        /// Archive path
        zip_path: PathBuf,

        /// Replace existing rules with matching ids
        #[arg(long)]
        overwrite: bool,
    },

    /// List imported log files and their registered formats
    #[command(alias = "logs")]
    ListLogFiles,

    /// Copy a log file into the library and register its format
    ImportLogFile {
        /// Source file
        source_path: PathBuf,

        /// Log format (cloudtrail or flatjson)
        #[arg(long, value_enum)]
        log_type: LogFormat,
    },

    /// Copy several log files into the library under one format
    ImportLogFiles {
        /// Source files
        #[arg(required = true, num_args = 1..)]
        source_paths: Vec<PathBuf>,

        /// Log format (cloudtrail or flatjson)
        #[arg(long, value_enum)]
        log_type: LogFormat,
    },

    /// Change the registered format of a library file
    UpdateLogType {
        /// Library filename
        filename: String,

        /// New log format
        #[arg(long, value_enum)]
        log_type: LogFormat,
    },

    /// Remove a log file from the library
    DeleteLogFile {
        /// Library filename
        filename: String,
    },

    /// Parse a log file and print its records
    LoadLogEvents {
        /// Filesystem path or library filename
        log_path: String,

        /// Log format; defaults to the library's registered format
        #[arg(long, value_enum)]
        log_type: Option<LogFormat>,

        /// Print at most N records (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Scan one log file with the active rules
    #[command(alias = "scan")]
    ScanLogs {
        /// Filesystem path or library filename
        log_path: String,

        /// Log format; defaults to the library's registered format
        #[arg(long, value_enum)]
        log_type: Option<LogFormat>,
    },

    /// Scan every log file in the library
    ScanAllLogs,

    /// Check whether a file parses under any supported format
    ValidateLogFile {
        /// File to check
        log_path: PathBuf,
    },

    /// Check a condition string for syntax errors
    ValidateCondition {
        /// Condition to validate
        condition: String,
    },

    /// Evaluate a condition against a log file without saving a rule
    TestRule {
        /// Condition to evaluate
        condition: String,

        /// Filesystem path or library filename
        log_path: String,

        /// Log format; defaults to the library's registered format
        #[arg(long, value_enum)]
        log_type: Option<LogFormat>,
    },

    /// Run an analytical SQL query (DuckDB) over log files by path
    #[command(alias = "query")]
    RunQuery {
        /// SQL text, e.g. "SELECT eventName, count(*) FROM read_json('x.json') GROUP BY 1"
        query: String,
    },

    /// Print the resolved configuration
    ShowConfig,

    /// Point the rule store at a different directory
    SetRulesDirectory {
        /// New rules directory
        dir: PathBuf,
    },

    /// Point the log library at a different directory
    SetLogsDirectory {
        /// New logs directory
        dir: PathBuf,
    },
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
