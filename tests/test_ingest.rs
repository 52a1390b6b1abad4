use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use trailscan::commands;
use trailscan::ingest::{self, FormatError, LogFormat};

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_cloudtrail_envelope_yields_records_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "trail.json",
        &json!({
            "Records": [
                {"eventName": "ConsoleLogin", "awsRegion": "us-east-1"},
                {"eventName": "AssumeRole", "awsRegion": "eu-west-1"},
                {"eventName": "PutObject", "awsRegion": "us-east-1"}
            ]
        })
        .to_string(),
    );

    let records = ingest::load_records(&path, LogFormat::CloudTrail).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["eventName"], "ConsoleLogin");
    assert_eq!(records[2]["eventName"], "PutObject");
}

#[test]
fn test_cloudtrail_without_envelope_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = write_file(dir.path(), "no-records.json", r#"{"events": []}"#);
    assert!(matches!(
        ingest::load_records(&missing, LogFormat::CloudTrail),
        Err(FormatError::MissingRecords { .. })
    ));

    let not_array = write_file(dir.path(), "bad-records.json", r#"{"Records": "nope"}"#);
    assert!(matches!(
        ingest::load_records(&not_array, LogFormat::CloudTrail),
        Err(FormatError::RecordsNotArray { .. })
    ));

    let not_json = write_file(dir.path(), "not-json.json", "plainly not json");
    assert!(matches!(
        ingest::load_records(&not_json, LogFormat::CloudTrail),
        Err(FormatError::Json { .. })
    ));
}

#[test]
fn test_cloudtrail_non_object_entry_reports_its_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "mixed.json",
        r#"{"Records": [{"eventName": "a"}, 42]}"#,
    );
    match ingest::load_records(&path, LogFormat::CloudTrail) {
        Err(FormatError::RecordNotObject { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected RecordNotObject, got {:?}", other),
    }
}

#[test]
fn test_flatjson_single_object_is_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "single.json",
        "  \n {\"verb\": \"create\", \"user\": {\"name\": \"admin\"}}\n",
    );
    let records = ingest::load_records(&path, LogFormat::FlatJson).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["verb"], "create");
}

#[test]
fn test_ndjson_skips_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    // Three lines, the middle one blank: two records.
    let path = write_file(
        dir.path(),
        "events.ndjson",
        "{\"seq\": 1}\n\n{\"seq\": 2}\n",
    );
    let records = ingest::load_records(&path, LogFormat::FlatJson).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["seq"], 1);
    assert_eq!(records[1]["seq"], 2);
}

#[test]
fn test_ndjson_bad_line_error_names_the_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "broken.ndjson",
        "{\"seq\": 1}\n\nnot json at all\n{\"seq\": 3}\n",
    );
    match ingest::load_records(&path, LogFormat::FlatJson) {
        Err(FormatError::BadLine { line, .. }) => {
            // blank lines still count toward the reported line number
            assert_eq!(line, 3);
        }
        other => panic!("expected BadLine, got {:?}", other),
    }
}

#[test]
fn test_ndjson_non_object_line_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "scalars.ndjson", "{\"seq\": 1}\n[1, 2, 3]\n");
    match ingest::load_records(&path, LogFormat::FlatJson) {
        Err(FormatError::LineNotObject { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected LineNotObject, got {:?}", other),
    }
}

#[test]
fn test_lazy_sequence_yields_records_before_failing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "partial.ndjson",
        "{\"seq\": 1}\nbroken line\n{\"seq\": 3}\n",
    );
    let mut iter = ingest::read_records(&path, LogFormat::FlatJson).unwrap();
    let first = iter.next().unwrap().unwrap();
    assert_eq!(first["seq"], 1);
    assert!(matches!(
        iter.next(),
        Some(Err(FormatError::BadLine { line: 2, .. }))
    ));
}

#[test]
fn test_validate_log_file_command() {
    let dir = tempfile::tempdir().unwrap();
    let trail = write_file(dir.path(), "trail.json", r#"{"Records": []}"#);
    assert!(commands::validate_log_file(&trail));

    let ndjson = write_file(dir.path(), "flat.ndjson", "{\"a\": 1}\n{\"a\": 2}\n");
    assert!(commands::validate_log_file(&ndjson));

    let junk = write_file(dir.path(), "junk.txt", "not a log file");
    assert!(!commands::validate_log_file(&junk));
}
