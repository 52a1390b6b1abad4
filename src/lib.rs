pub mod cli;
pub mod commands;
pub mod condition;
pub mod config;
pub mod ingest;
pub mod library;
pub mod query;
pub mod rule;
pub mod scanner;
pub mod store;

pub use cli::{Cli, ColorMode, Commands, OutputFormat, cli_parse};
pub use condition::{ConditionError, ValidationResult};
pub use config::Workspace;
pub use ingest::{FormatError, LogFormat, Record};
pub use library::LogFileInfo;
pub use rule::{Rule, RuleStatus, Severity};
pub use scanner::{Alert, BulkScanResponse, ScanResponse, TestRuleResult};
pub use store::{ImportSummary, RuleListing};

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use indicatif::ProgressBar;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli_parse();

    // Set up color handling based on user preference
    match cli.color {
        ColorMode::Always => unsafe {
            std::env::set_var("CLICOLOR_FORCE", "1");
        },
        ColorMode::Never => unsafe {
            std::env::set_var("NO_COLOR", "1");
        },
        ColorMode::Auto => {}
    }

    let mut workspace = Workspace::open(&cli.data_dir)
        .map_err(|e| format!("Failed to open data directory: {}", e))?;

    if cli.verbose > 0 && !cli.quiet {
        eprintln!("Data directory: {}", workspace.data_dir().display());
        eprintln!("Rules directory: {}", workspace.rules_dir().display());
        eprintln!("Logs directory: {}", workspace.logs_dir().display());
        if let Some(out_path) = &cli.output {
            eprintln!("Output will be written to: {}", out_path.display());
        }
    }

    let rendered = dispatch(&cli, &mut workspace)?;
    print!("{}", rendered);
    if let Some(path) = &cli.output {
        write_output_file(path, &rendered)?;
    }
    Ok(())
}

fn dispatch(cli: &Cli, workspace: &mut Workspace) -> Result<String, Box<dyn std::error::Error>> {
    let format = cli.format;
    match &cli.command {
        Commands::ListRules { status } => {
            let mut listing = commands::list_rules(workspace)
                .map_err(|e| format!("Failed to list rules: {}", e))?;
            if let Some(status) = status {
                listing.rules.retain(|r| r.status == *status);
            }
            Ok(match format {
                OutputFormat::Text => format_rules_text(&listing),
                OutputFormat::Json => to_json(&listing)?,
            })
        }
        Commands::GetRule { rule_id } => {
            let rule = commands::get_rule(workspace, rule_id)
                .map_err(|e| format!("Failed to load rule: {}", e))?;
            Ok(match format {
                OutputFormat::Text => serde_yaml::to_string(&rule)
                    .map_err(|e| format!("Failed to render rule: {}", e))?,
                OutputFormat::Json => to_json(&rule)?,
            })
        }
        Commands::SaveRule { file } => {
            let text = std::fs::read_to_string(file)
                .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
            let rule: Rule = serde_yaml::from_str(&text)
                .map_err(|e| format!("Failed to parse '{}': {}", file.display(), e))?;
            let saved = commands::save_rule(workspace, rule)
                .map_err(|e| format!("Failed to save rule: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format!("Saved rule '{}' ({})\n", saved.title, saved.id),
                OutputFormat::Json => to_json(&saved)?,
            })
        }
        Commands::DeleteRule { rule_id } => {
            commands::delete_rule(workspace, rule_id)
                .map_err(|e| format!("Failed to delete rule: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format!("Deleted rule '{}'\n", rule_id),
                OutputFormat::Json => "{}\n".to_string(),
            })
        }
        Commands::ExportRule { rule_id, dest_path } => {
            commands::export_rule(workspace, rule_id, dest_path)
                .map_err(|e| format!("Failed to export rule: {}", e))?;
            Ok(match format {
                OutputFormat::Text => {
                    format!("Exported rule '{}' to {}\n", rule_id, dest_path.display())
                }
                OutputFormat::Json => "{}\n".to_string(),
            })
        }
        Commands::ExportAllRules { dest_path } => {
            let count = commands::export_all_rules(workspace, dest_path)
                .map_err(|e| format!("Failed to export rules: {}", e))?;
            Ok(match format {
                OutputFormat::Text => {
                    format!("Exported {} rules to {}\n", count, dest_path.display())
                }
                OutputFormat::Json => format!("{{\"count\": {}}}\n", count),
            })
        }
        Commands::ImportRule {
            source_path,
            overwrite,
        } => {
            let rule = commands::import_rule(workspace, source_path, *overwrite)
                .map_err(|e| format!("Failed to import rule: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format!("Imported rule '{}' ({})\n", rule.title, rule.id),
                OutputFormat::Json => to_json(&rule)?,
            })
        }
        Commands::ImportRules {
            file_paths,
            overwrite,
        } => {
            let summary = commands::import_multiple_rules(workspace, file_paths, *overwrite)
                .map_err(|e| format!("Failed to import rules: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_import_summary_text(&summary),
                OutputFormat::Json => to_json(&summary)?,
            })
        }
        Commands::ImportRulesZip {
            zip_path,
            overwrite,
        } => {
            let summary = commands::import_rules_zip(workspace, zip_path, *overwrite)
                .map_err(|e| format!("Failed to import archive: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_import_summary_text(&summary),
                OutputFormat::Json => to_json(&summary)?,
            })
        }
        Commands::ListLogFiles => {
            let files = commands::list_log_files(workspace)
                .map_err(|e| format!("Failed to list log files: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_log_files_text(&files),
                OutputFormat::Json => to_json(&files)?,
            })
        }
        Commands::ImportLogFile {
            source_path,
            log_type,
        } => {
            let info = commands::import_log_file(workspace, source_path, *log_type)
                .map_err(|e| format!("Failed to import log file: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format!(
                    "Imported '{}' ({} bytes) as {}\n",
                    info.filename, info.size_bytes, log_type
                ),
                OutputFormat::Json => to_json(&info)?,
            })
        }
        Commands::ImportLogFiles {
            source_paths,
            log_type,
        } => {
            let summary = commands::import_multiple_log_files(workspace, source_paths, *log_type)
                .map_err(|e| format!("Failed to import log files: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_import_summary_text(&summary),
                OutputFormat::Json => to_json(&summary)?,
            })
        }
        Commands::UpdateLogType { filename, log_type } => {
            commands::update_log_type(workspace, filename, *log_type)
                .map_err(|e| format!("Failed to update log type: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format!("'{}' is now registered as {}\n", filename, log_type),
                OutputFormat::Json => "{}\n".to_string(),
            })
        }
        Commands::DeleteLogFile { filename } => {
            commands::delete_log_file(workspace, filename)
                .map_err(|e| format!("Failed to delete log file: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format!("Deleted '{}'\n", filename),
                OutputFormat::Json => "{}\n".to_string(),
            })
        }
        Commands::LoadLogEvents {
            log_path,
            log_type,
            limit,
        } => {
            let records = commands::load_log_events(workspace, log_path, *log_type)
                .map_err(|e| format!("Failed to load events: {}", e))?;
            Ok(format_records(&records, *limit, format)?)
        }
        Commands::ScanLogs { log_path, log_type } => {
            let response = commands::scan_logs(workspace, log_path, *log_type)
                .map_err(|e| format!("Scan failed: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_scan_text(&response),
                OutputFormat::Json => to_json(&response)?,
            })
        }
        Commands::ScanAllLogs => {
            let show_progress = matches!(format, OutputFormat::Text) && !cli.quiet;
            let bar = if show_progress {
                let files = commands::list_log_files(workspace)
                    .map_err(|e| format!("Failed to list log files: {}", e))?;
                Some(ProgressBar::new(files.len() as u64))
            } else {
                None
            };
            let response = commands::scan_all_logs(workspace, |filename| {
                if let Some(bar) = &bar {
                    bar.set_message(filename.to_string());
                    bar.inc(1);
                }
            })
            .map_err(|e| format!("Bulk scan failed: {}", e))?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            Ok(match format {
                OutputFormat::Text => format_bulk_scan_text(&response),
                OutputFormat::Json => to_json(&response)?,
            })
        }
        Commands::ValidateLogFile { log_path } => {
            let valid = commands::validate_log_file(log_path);
            Ok(match format {
                OutputFormat::Text => {
                    if valid {
                        format!("{} is a supported log file\n", log_path.display())
                    } else {
                        format!("{} is not a supported log file\n", log_path.display())
                    }
                }
                OutputFormat::Json => format!("{{\"valid\": {}}}\n", valid),
            })
        }
        Commands::ValidateCondition { condition } => {
            let result = commands::validate_condition(condition);
            Ok(match format {
                OutputFormat::Text => format_validation_text(&result),
                OutputFormat::Json => to_json(&result)?,
            })
        }
        Commands::TestRule {
            condition,
            log_path,
            log_type,
        } => {
            let result = commands::test_rule(workspace, condition, log_path, *log_type)
                .map_err(|e| format!("Rule test failed: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_test_rule_text(&result),
                OutputFormat::Json => to_json(&result)?,
            })
        }
        Commands::RunQuery { query } => {
            let result = commands::run_query(query).map_err(|e| format!("Query failed: {}", e))?;
            Ok(match format {
                OutputFormat::Text => format_query_text(&result),
                OutputFormat::Json => to_json(&result)?,
            })
        }
        Commands::ShowConfig => Ok(to_json(workspace.config())?),
        Commands::SetRulesDirectory { dir } => {
            workspace
                .set_rules_directory(Some(dir.clone()))
                .map_err(|e| format!("Failed to update config: {}", e))?;
            Ok(format!("Rules directory set to {}\n", dir.display()))
        }
        Commands::SetLogsDirectory { dir } => {
            workspace
                .set_logs_directory(Some(dir.clone()))
                .map_err(|e| format!("Failed to update config: {}", e))?;
            Ok(format!("Logs directory set to {}\n", dir.display()))
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, Box<dyn std::error::Error>> {
    let mut text =
        serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize: {}", e))?;
    text.push('\n');
    Ok(text)
}

fn write_output_file(path: &Path, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, content)
        .map_err(|e| format!("Failed to write output file '{}': {}", path.display(), e).into())
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Critical => "CRITICAL".red().bold(),
        Severity::High => "HIGH".red(),
        Severity::Medium => "MEDIUM".yellow(),
        Severity::Low => "LOW".cyan(),
        Severity::Info => "INFO".normal(),
    }
}

fn format_rules_text(listing: &RuleListing) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "RULES: {} loaded{}",
        listing.rules.len(),
        if listing.malformed.is_empty() {
            String::new()
        } else {
            format!(", {} malformed", listing.malformed.len())
        }
    );

    if !listing.rules.is_empty() {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Title", "Id", "Status", "Severity", "Tags"]);
        for rule in &listing.rules {
            table.add_row(vec![
                rule.title.clone(),
                rule.id.clone(),
                rule.status.as_str().to_string(),
                rule.detection.severity.as_str().to_string(),
                rule.tags.join(", "),
            ]);
        }
        let _ = writeln!(out, "{}", table);
    }

    for malformed in &listing.malformed {
        let _ = writeln!(
            out,
            "  {} {}: {}",
            "malformed".red(),
            malformed.file,
            malformed.error
        );
    }
    out
}

fn format_log_files_text(files: &[LogFileInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "LOG FILES: {}", files.len());
    if files.is_empty() {
        return out;
    }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Filename", "Type", "Size", "Imported"]);
    for file in files {
        table.add_row(vec![
            file.filename.clone(),
            file.log_type
                .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
            format!("{}", file.size_bytes),
            file.imported_at
                .map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    let _ = writeln!(out, "{}", table);
    out
}

fn format_import_summary_text(summary: &ImportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "IMPORT: {} imported, {} skipped, {} failed",
        summary.success_count,
        summary.skipped.len(),
        summary.errors.len()
    );
    for name in &summary.skipped {
        let _ = writeln!(out, "  {} {} (already exists)", "skipped".yellow(), name);
    }
    for error in &summary.errors {
        let _ = writeln!(out, "  {} {}", "error".red(), error);
    }
    out
}

fn format_records(
    records: &[Record],
    limit: usize,
    format: OutputFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let shown: Vec<&Record> = if limit == 0 {
        records.iter().collect()
    } else {
        records.iter().take(limit).collect()
    };
    match format {
        OutputFormat::Json => to_json(&shown),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "EVENTS: {} record{}{}",
                records.len(),
                if records.len() == 1 { "" } else { "s" },
                if shown.len() < records.len() {
                    format!(" (showing {})", shown.len())
                } else {
                    String::new()
                }
            );
            for record in shown {
                let line = serde_json::to_string(record)
                    .unwrap_or_else(|_| "<failed to serialize record>".to_string());
                let _ = writeln!(out, "{}", line);
            }
            Ok(out)
        }
    }
}

fn format_scan_text(response: &ScanResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "SCAN: {} alert{} from {} rule{} over {} record{} ({} ms)",
        response.alerts.len(),
        if response.alerts.len() == 1 { "" } else { "s" },
        response.rules_evaluated,
        if response.rules_evaluated == 1 { "" } else { "s" },
        response.records_scanned,
        if response.records_scanned == 1 { "" } else { "s" },
        response.scan_time_ms
    );

    for alert in &response.alerts {
        out.push('\n');
        let _ = writeln!(
            out,
            " [{}] {}  ×{}",
            severity_label(alert.severity),
            alert.rule_title,
            alert.match_count
        );
        if let Some(title) = &alert.alert_title {
            let _ = writeln!(out, "     {}", title);
        }
        let _ = writeln!(out, "     rule: {}", alert.rule_id);
        let _ = writeln!(
            out,
            "     evidence: {} record{}{}",
            alert.evidence.len(),
            if alert.evidence.len() == 1 { "" } else { "s" },
            if alert.evidence_truncated {
                format!(" (capped at {})", scanner::EVIDENCE_CAP)
            } else {
                String::new()
            }
        );
        if let Some(basis) = alert.aggregation_basis {
            let basis = match basis {
                scanner::AggregationBasis::EventTime => "eventTime window",
                scanner::AggregationBasis::RecordPosition => {
                    "record-position window (no eventTime on matches)"
                }
            };
            let _ = writeln!(out, "     aggregation: {}", basis);
        }
    }

    if !response.skipped_rules.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "Skipped rules:");
        for skipped in &response.skipped_rules {
            let _ = writeln!(out, "  {} {}: {}", "!".red(), skipped.rule_id, skipped.error);
        }
    }
    out
}

fn format_bulk_scan_text(response: &BulkScanResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "BULK SCAN: {} alert{} across {} file{} ({} ms)",
        response.total_alerts,
        if response.total_alerts == 1 { "" } else { "s" },
        response.total_files_scanned,
        if response.total_files_scanned == 1 {
            ""
        } else {
            "s"
        },
        response.total_scan_time_ms
    );

    for result in &response.file_results {
        if result.scan.alerts.is_empty() {
            let _ = writeln!(out, "\n{}: clean", result.filename);
        } else {
            let _ = writeln!(out, "\n{}:", result.filename);
            for alert in &result.scan.alerts {
                let _ = writeln!(
                    out,
                    "  [{}] {}  ×{}",
                    severity_label(alert.severity),
                    alert.rule_title,
                    alert.match_count
                );
            }
        }
    }

    if !response.failed_files.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "Failed files:");
        for failed in &response.failed_files {
            let _ = writeln!(out, "  {} {}: {}", "!".red(), failed.filename, failed.error);
        }
    }
    out
}

fn format_validation_text(result: &ValidationResult) -> String {
    let mut out = String::new();
    if result.valid {
        let _ = writeln!(out, "{}", "Condition is valid".green());
        return out;
    }
    let _ = writeln!(
        out,
        "{}: {}",
        "Invalid condition".red(),
        result.error.as_deref().unwrap_or("unknown error")
    );
    if let Some(position) = result.position {
        let _ = writeln!(out, "  at character {}", position);
    }
    for suggestion in &result.suggestions {
        let _ = writeln!(out, "  hint: {}", suggestion);
    }
    out
}

fn format_test_rule_text(result: &TestRuleResult) -> String {
    let mut out = String::new();
    if !result.syntax_valid {
        let _ = writeln!(
            out,
            "{}: {}",
            "Invalid condition".red(),
            result.syntax_error.as_deref().unwrap_or("unknown error")
        );
        return out;
    }

    let _ = writeln!(
        out,
        "TEST: {} of {} record{} matched ({} ms)",
        result.matched_count,
        result.total_count,
        if result.total_count == 1 { "" } else { "s" },
        result.execution_time_ms
    );
    if !result.matched_events.is_empty() {
        let shown = result.matched_events.len().min(10);
        let _ = writeln!(out, "\nMatched sample ({} shown):", shown);
        for record in result.matched_events.iter().take(shown) {
            let line = serde_json::to_string(record)
                .unwrap_or_else(|_| "<failed to serialize record>".to_string());
            let _ = writeln!(out, "  {}", line);
        }
    }
    if !result.sample_non_matched.is_empty() {
        let _ = writeln!(
            out,
            "\nNon-matched sample ({} shown):",
            result.sample_non_matched.len()
        );
        for record in &result.sample_non_matched {
            let line = serde_json::to_string(record)
                .unwrap_or_else(|_| "<failed to serialize record>".to_string());
            let _ = writeln!(out, "  {}", line);
        }
    }
    out
}

fn format_query_text(result: &crate::query::QueryResult) -> String {
    let mut out = String::new();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(result.columns.clone());
    for row in &result.rows {
        table.add_row(
            result
                .columns
                .iter()
                .map(|column| cell_text(row.get(column)))
                .collect::<Vec<_>>(),
        );
    }
    let _ = writeln!(out, "{}", table);
    let _ = writeln!(
        out,
        "({} row{}, {} ms)",
        result.row_count,
        if result.row_count == 1 { "" } else { "s" },
        result.execution_time_ms
    );
    out
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
