use crate::condition::{self, Expr};
use crate::ingest::{self, LogFormat, Record};
use crate::library::LogLibrary;
use crate::rule::{Rule, RuleError, Severity, Threshold, Window};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Evidence records attached to one alert are capped; the flag records
/// that the cap was hit.
pub const EVIDENCE_CAP: usize = 100;

/// Non-matching sample size in the rule test harness.
pub const NON_MATCH_SAMPLE: usize = 5;

/// Field consulted for time-windowed aggregation.
const EVENT_TIME_FIELD: &str = "eventTime";

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub rule_id: String,
    pub rule_title: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub match_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_title: Option<String>,
    pub evidence: Vec<Record>,
    pub evidence_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_basis: Option<AggregationBasis>,
}

/// Which clock the sliding window ran on. `RecordPosition` is the
/// degraded mode for logs without a parseable `eventTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationBasis {
    EventTime,
    RecordPosition,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub alerts: Vec<Alert>,
    pub rules_evaluated: usize,
    pub records_scanned: usize,
    pub scan_time_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_rules: Vec<SkippedRule>,
}

/// A rule whose condition failed to parse during a scan. The scan
/// continues without it.
#[derive(Debug, Serialize)]
pub struct SkippedRule {
    pub rule_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkScanResponse {
    pub total_alerts: usize,
    pub total_files_scanned: usize,
    pub total_scan_time_ms: u64,
    pub file_results: Vec<FileScanResult>,
    pub failed_files: Vec<FailedFile>,
}

#[derive(Debug, Serialize)]
pub struct FileScanResult {
    pub filename: String,
    #[serde(flatten)]
    pub scan: ScanResponse,
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TestRuleResult {
    pub syntax_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<String>,
    pub matched_count: usize,
    pub total_count: usize,
    pub matched_events: Vec<Record>,
    pub sample_non_matched: Vec<Record>,
    pub execution_time_ms: u64,
}

/// Run the active subset of `rules` over an already-materialized record
/// buffer. Alerts come out in rule order; evidence preserves record
/// order. Rules whose condition fails to parse are skipped and reported.
pub fn scan_records(records: &[Record], rules: &[Rule], source_file: Option<&str>) -> ScanResponse {
    let started = Instant::now();
    let mut alerts = Vec::new();
    let mut skipped_rules = Vec::new();
    let mut rules_evaluated = 0;

    for rule in rules.iter().filter(|r| r.is_active()) {
        rules_evaluated += 1;
        match evaluate_rule(rule, records, source_file) {
            Ok(Some(alert)) => alerts.push(alert),
            Ok(None) => {}
            Err(err) => skipped_rules.push(SkippedRule {
                rule_id: rule.id.clone(),
                error: err.to_string(),
            }),
        }
    }

    ScanResponse {
        alerts,
        rules_evaluated,
        records_scanned: records.len(),
        scan_time_ms: started.elapsed().as_millis() as u64,
        skipped_rules,
    }
}

/// Load one file and scan it.
pub fn scan_file(
    path: &std::path::Path,
    format: LogFormat,
    rules: &[Rule],
    source_file: Option<&str>,
) -> Result<ScanResponse, ingest::FormatError> {
    let records = ingest::load_records(path, format)?;
    Ok(scan_records(&records, rules, source_file))
}

/// Scan every file in the library. Per-file failures (unknown format,
/// parse errors) are collected, never fatal. `progress` is invoked with
/// each filename before its scan.
pub fn scan_library(
    library: &LogLibrary,
    rules: &[Rule],
    mut progress: impl FnMut(&str),
) -> Result<BulkScanResponse, crate::library::LibraryError> {
    let started = Instant::now();
    let files = library.list()?;

    let mut response = BulkScanResponse {
        total_alerts: 0,
        total_files_scanned: 0,
        total_scan_time_ms: 0,
        file_results: Vec::new(),
        failed_files: Vec::new(),
    };

    for info in files {
        progress(&info.filename);
        let Some(format) = info.log_type else {
            response.failed_files.push(FailedFile {
                filename: info.filename,
                error: "no log type registered; set one with update-log-type".to_string(),
            });
            continue;
        };
        match scan_file(
            &library.path_of(&info.filename),
            format,
            rules,
            Some(&info.filename),
        ) {
            Ok(scan) => {
                response.total_alerts += scan.alerts.len();
                response.total_files_scanned += 1;
                response.file_results.push(FileScanResult {
                    filename: info.filename,
                    scan,
                });
            }
            Err(err) => response.failed_files.push(FailedFile {
                filename: info.filename,
                error: err.to_string(),
            }),
        }
    }

    response.total_scan_time_ms = started.elapsed().as_millis() as u64;
    Ok(response)
}

/// Validate a condition and, when it parses, report how it behaves
/// against one file's records.
pub fn test_condition(condition: &str, records: &[Record]) -> TestRuleResult {
    let started = Instant::now();
    let expr = match condition::parse(condition) {
        Ok(expr) => expr,
        Err(err) => {
            return TestRuleResult {
                syntax_valid: false,
                syntax_error: Some(err.to_string()),
                matched_count: 0,
                total_count: records.len(),
                matched_events: Vec::new(),
                sample_non_matched: Vec::new(),
                execution_time_ms: started.elapsed().as_millis() as u64,
            };
        }
    };
    let mut matched_count = 0;
    let mut matched_events = Vec::new();
    let mut sample_non_matched = Vec::new();
    for record in records {
        if condition::eval(&expr, record) {
            matched_count += 1;
            if matched_events.len() < EVIDENCE_CAP {
                matched_events.push(record.clone());
            }
        } else if sample_non_matched.len() < NON_MATCH_SAMPLE {
            sample_non_matched.push(record.clone());
        }
    }

    TestRuleResult {
        syntax_valid: true,
        syntax_error: None,
        matched_count,
        total_count: records.len(),
        matched_events,
        sample_non_matched,
        execution_time_ms: started.elapsed().as_millis() as u64,
    }
}

/// One rule against the record buffer: parse once, collect matching
/// indices, apply the optional threshold window, build the alert.
fn evaluate_rule(
    rule: &Rule,
    records: &[Record],
    source_file: Option<&str>,
) -> Result<Option<Alert>, RuleError> {
    let expr: Expr = condition::parse(&rule.detection.condition)?;

    let match_indices: Vec<usize> = records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| condition::eval(&expr, record).then_some(idx))
        .collect();
    if match_indices.is_empty() {
        return Ok(None);
    }

    let mut aggregation_basis = None;
    if let Some(aggregation) = &rule.detection.aggregation
        && aggregation.enabled
    {
        let window = Window::parse(&aggregation.window)?;
        let threshold = Threshold::parse(&aggregation.threshold)?;
        let (fired, basis) = window_satisfied(records, &match_indices, window, threshold);
        if !fired {
            return Ok(None);
        }
        aggregation_basis = Some(basis);
    }

    let evidence: Vec<Record> = match_indices
        .iter()
        .take(EVIDENCE_CAP)
        .map(|&idx| records[idx].clone())
        .collect();
    let alert_title = rule.render_alert_title(&records[match_indices[0]]);

    Ok(Some(Alert {
        rule_id: rule.id.clone(),
        rule_title: rule.title.clone(),
        severity: rule.detection.severity,
        timestamp: Utc::now(),
        match_count: match_indices.len(),
        alert_title,
        evidence_truncated: match_indices.len() > EVIDENCE_CAP,
        evidence,
        source_file: source_file.map(str::to_string),
        aggregation_basis,
    }))
}

/// Sliding-window threshold check. Windows slide over `eventTime` when
/// every match carries one; otherwise over record positions, using the
/// window's integer magnitude as a record-count span.
fn window_satisfied(
    records: &[Record],
    match_indices: &[usize],
    window: Window,
    threshold: Threshold,
) -> (bool, AggregationBasis) {
    let times: Option<Vec<i64>> = match_indices
        .iter()
        .map(|&idx| event_time_millis(&records[idx]))
        .collect();

    match times {
        Some(mut times) => {
            times.sort_unstable();
            let span = window.as_seconds() * 1000;
            (
                any_window_satisfies(&times, span, threshold),
                AggregationBasis::EventTime,
            )
        }
        None => {
            let positions: Vec<i64> = match_indices.iter().map(|&idx| idx as i64).collect();
            let span = window.magnitude.saturating_sub(1) as i64;
            (
                any_window_satisfies(&positions, span, threshold),
                AggregationBasis::RecordPosition,
            )
        }
    }
}

/// Two-pointer sweep: for each right edge, count points in
/// `[edge - span, edge]` and test the threshold.
fn any_window_satisfies(points: &[i64], span: i64, threshold: Threshold) -> bool {
    let mut lo = 0;
    for hi in 0..points.len() {
        while points[hi] - points[lo] > span {
            lo += 1;
        }
        if threshold.satisfied_by(hi - lo + 1) {
            return true;
        }
    }
    false
}

fn event_time_millis(record: &Record) -> Option<i64> {
    let value = record.get(EVENT_TIME_FIELD)?.as_str()?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ThresholdOp;

    #[test]
    fn test_window_sweep_counts_inclusive_edges() {
        let threshold = Threshold {
            op: ThresholdOp::Ge,
            count: 3,
        };
        // three points spread across exactly the span
        assert!(any_window_satisfies(&[0, 50, 100], 100, threshold));
        // and just past it
        assert!(!any_window_satisfies(&[0, 50, 101], 100, threshold));
    }

    #[test]
    fn test_window_sweep_finds_dense_burst_in_sparse_tail() {
        let threshold = Threshold {
            op: ThresholdOp::Gt,
            count: 2,
        };
        let points = [0, 1000, 1001, 1002, 5000];
        assert!(any_window_satisfies(&points, 10, threshold));
    }
}
