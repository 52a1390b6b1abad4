//! The engine's command surface. Function names and argument keys are
//! contractual (snake_case) for shell collaborators; the CLI in `lib.rs`
//! is one such consumer.

use crate::condition::{self, ValidationResult};
use crate::config::Workspace;
use crate::ingest::{self, LogFormat, Record};
use crate::library::{LibraryError, LogFileInfo, LogLibrary};
use crate::query::{QueryError, QueryResult};
use crate::rule::Rule;
use crate::scanner::{self, BulkScanResponse, ScanResponse, TestRuleResult};
use crate::store::{ImportSummary, RuleListing, RuleStore, StoreError};
use anyhow::{anyhow, bail};
use std::path::{Path, PathBuf};

fn rule_store(workspace: &Workspace) -> Result<RuleStore, StoreError> {
    RuleStore::open(&workspace.rules_dir())
}

fn log_library(workspace: &Workspace) -> Result<LogLibrary, LibraryError> {
    LogLibrary::open(&workspace.logs_dir())
}

// ---- rules ----

pub fn list_rules(workspace: &Workspace) -> Result<RuleListing, StoreError> {
    rule_store(workspace)?.list()
}

pub fn get_rule(workspace: &Workspace, rule_id: &str) -> Result<Rule, StoreError> {
    rule_store(workspace)?.get(rule_id)
}

pub fn save_rule(workspace: &Workspace, rule: Rule) -> Result<Rule, StoreError> {
    rule_store(workspace)?.save(rule)
}

pub fn delete_rule(workspace: &Workspace, rule_id: &str) -> Result<(), StoreError> {
    rule_store(workspace)?.delete(rule_id)
}

pub fn export_rule(
    workspace: &Workspace,
    rule_id: &str,
    dest_path: &Path,
) -> Result<(), StoreError> {
    rule_store(workspace)?.export_rule(rule_id, dest_path)
}

pub fn export_all_rules(workspace: &Workspace, dest_path: &Path) -> Result<usize, StoreError> {
    rule_store(workspace)?.export_all(dest_path)
}

pub fn import_rule(
    workspace: &Workspace,
    source_path: &Path,
    overwrite: bool,
) -> Result<Rule, StoreError> {
    rule_store(workspace)?.import_file(source_path, overwrite)
}

pub fn import_multiple_rules(
    workspace: &Workspace,
    file_paths: &[PathBuf],
    overwrite: bool,
) -> Result<ImportSummary, StoreError> {
    Ok(rule_store(workspace)?.import_files(file_paths, overwrite))
}

pub fn import_rules_zip(
    workspace: &Workspace,
    zip_path: &Path,
    overwrite: bool,
) -> Result<ImportSummary, StoreError> {
    rule_store(workspace)?.import_zip(zip_path, overwrite)
}

// ---- log library ----

pub fn list_log_files(workspace: &Workspace) -> Result<Vec<LogFileInfo>, LibraryError> {
    log_library(workspace)?.list()
}

pub fn import_log_file(
    workspace: &mut Workspace,
    source_path: &Path,
    log_type: LogFormat,
) -> anyhow::Result<LogFileInfo> {
    let info = log_library(workspace)?.import(source_path, log_type)?;
    workspace.note_recent_file(&info.filename)?;
    Ok(info)
}

pub fn import_multiple_log_files(
    workspace: &mut Workspace,
    source_paths: &[PathBuf],
    log_type: LogFormat,
) -> anyhow::Result<ImportSummary> {
    let library = log_library(workspace)?;
    let mut summary = ImportSummary::default();
    let mut imported = Vec::new();
    for source in source_paths {
        let label = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        match library.import(source, log_type) {
            Ok(info) => {
                summary.success_count += 1;
                imported.push(info.filename);
            }
            Err(LibraryError::Duplicate(_)) => summary.skipped.push(label),
            Err(err) => summary.errors.push(format!("{}: {}", label, err)),
        }
    }
    for filename in imported {
        workspace.note_recent_file(&filename)?;
    }
    Ok(summary)
}

pub fn update_log_type(
    workspace: &Workspace,
    filename: &str,
    log_type: LogFormat,
) -> Result<(), LibraryError> {
    log_library(workspace)?.update_log_type(filename, log_type)
}

pub fn delete_log_file(workspace: &Workspace, filename: &str) -> Result<(), LibraryError> {
    log_library(workspace)?.delete(filename)
}

// ---- scanning & evaluation ----

pub fn load_log_events(
    workspace: &Workspace,
    log_path: &str,
    log_type: Option<LogFormat>,
) -> anyhow::Result<Vec<Record>> {
    let (path, format) = resolve_log(workspace, log_path, log_type)?;
    Ok(ingest::load_records(&path, format)?)
}

pub fn scan_logs(
    workspace: &mut Workspace,
    log_path: &str,
    log_type: Option<LogFormat>,
) -> anyhow::Result<ScanResponse> {
    let (path, format) = resolve_log(workspace, log_path, log_type)?;
    let rules = rule_store(workspace)?.list()?.rules;
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let response = scanner::scan_file(&path, format, &rules, source_file.as_deref())?;
    workspace.note_recent_file(log_path)?;
    Ok(response)
}

pub fn scan_all_logs(
    workspace: &Workspace,
    progress: impl FnMut(&str),
) -> anyhow::Result<BulkScanResponse> {
    let rules = rule_store(workspace)?.list()?.rules;
    let library = log_library(workspace)?;
    Ok(scanner::scan_library(&library, &rules, progress)?)
}

pub fn validate_log_file(log_path: &Path) -> bool {
    ingest::probe(log_path).is_some()
}

pub fn validate_condition(condition: &str) -> ValidationResult {
    condition::validate(condition)
}

pub fn test_rule(
    workspace: &Workspace,
    condition: &str,
    log_path: &str,
    log_type: Option<LogFormat>,
) -> anyhow::Result<TestRuleResult> {
    let records = load_log_events(workspace, log_path, log_type)?;
    Ok(scanner::test_condition(condition, &records))
}

pub fn run_query(query: &str) -> Result<QueryResult, QueryError> {
    crate::query::run_query(query)
}

/// Resolve a log reference to a concrete path and format. The reference
/// may be a filesystem path or a library filename; the format comes from
/// the caller or, for library files, the metadata sidecar. The engine
/// never guesses a format.
fn resolve_log(
    workspace: &Workspace,
    log_path: &str,
    log_type: Option<LogFormat>,
) -> anyhow::Result<(PathBuf, LogFormat)> {
    let library = log_library(workspace)?;
    let given = Path::new(log_path);

    let (path, library_name) = if given.is_file() {
        let name = given
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        (given.to_path_buf(), name)
    } else {
        let candidate = library.path_of(log_path);
        if !candidate.is_file() {
            bail!("log file '{}' not found on disk or in the library", log_path);
        }
        (candidate, Some(log_path.to_string()))
    };

    let format = match log_type {
        Some(format) => format,
        None => library_name
            .as_deref()
            .and_then(|name| library.log_type_of(name).ok().flatten())
            .ok_or_else(|| {
                anyhow!(
                    "log type for '{}' is unknown; pass cloudtrail or flatjson explicitly",
                    log_path
                )
            })?,
    };
    Ok((path, format))
}
