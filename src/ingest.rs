use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use thiserror::Error;

/// One parsed event: a flat-or-nested JSON object.
pub type Record = Map<String, Value>;

/// Declared on-disk layout of a log file. The engine never guesses; the
/// caller (or the library metadata sidecar) supplies the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON object with a top-level `Records` array (AWS CloudTrail export)
    #[value(name = "cloudtrail")]
    CloudTrail,
    /// Single JSON object, or newline-delimited JSON objects
    #[value(name = "flatjson")]
    FlatJson,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::CloudTrail => "cloudtrail",
            LogFormat::FlatJson => "flatjson",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to read log file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{path}' has no top-level 'Records' array")]
    MissingRecords { path: String },

    #[error("'{path}': 'Records' is not an array")]
    RecordsNotArray { path: String },

    #[error("'{path}': Records[{index}] is not a JSON object")]
    RecordNotObject { path: String, index: usize },

    #[error("'{path}' line {line} is not valid JSON: {source}")]
    BadLine {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{path}' line {line}: expected a JSON object")]
    LineNotObject { path: String, line: usize },
}

/// Open a log file as a lazy, single-pass sequence of records.
///
/// CloudTrail and single-object files are fully parsed up front (the
/// envelope has to be); NDJSON files are read line by line. Callers that
/// need more than one pass collect eagerly — see [`load_records`].
pub fn read_records(path: &Path, format: LogFormat) -> Result<RecordIter, FormatError> {
    match format {
        LogFormat::CloudTrail => read_cloudtrail(path),
        LogFormat::FlatJson => read_flatjson(path),
    }
}

/// Eagerly materialize every record in the file.
pub fn load_records(path: &Path, format: LogFormat) -> Result<Vec<Record>, FormatError> {
    read_records(path, format)?.collect()
}

/// True when the file parses under at least one supported format. Used by
/// the validate command only; scans always take an explicit format.
pub fn probe(path: &Path) -> Option<LogFormat> {
    if load_records(path, LogFormat::CloudTrail).is_ok() {
        return Some(LogFormat::CloudTrail);
    }
    if load_records(path, LogFormat::FlatJson).is_ok() {
        return Some(LogFormat::FlatJson);
    }
    None
}

fn read_cloudtrail(path: &Path) -> Result<RecordIter, FormatError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| FormatError::Read {
        path: display.clone(),
        source,
    })?;
    let envelope: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| FormatError::Json {
            path: display.clone(),
            source,
        })?;
    let records = match &envelope {
        Value::Object(object) => match object.get("Records") {
            Some(Value::Array(records)) => records,
            Some(_) => return Err(FormatError::RecordsNotArray { path: display }),
            None => return Err(FormatError::MissingRecords { path: display }),
        },
        _ => return Err(FormatError::MissingRecords { path: display }),
    };

    let mut parsed = Vec::with_capacity(records.len());
    for (index, value) in records.iter().enumerate() {
        match value {
            Value::Object(map) => parsed.push(map.clone()),
            _ => {
                return Err(FormatError::RecordNotObject {
                    path: display,
                    index,
                });
            }
        }
    }
    Ok(RecordIter {
        inner: Inner::Buffered(parsed.into_iter()),
    })
}

fn read_flatjson(path: &Path) -> Result<RecordIter, FormatError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| FormatError::Read {
        path: display.clone(),
        source,
    })?;

    // A file whose first non-whitespace byte opens an object and that
    // parses whole is one event; anything else is treated as NDJSON.
    let trimmed = text.trim_start();
    if trimmed.starts_with('{')
        && let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed)
    {
        return Ok(RecordIter {
            inner: Inner::Buffered(vec![map].into_iter()),
        });
    }

    let file = File::open(path).map_err(|source| FormatError::Read {
        path: display.clone(),
        source,
    })?;
    Ok(RecordIter {
        inner: Inner::Lines {
            path: display,
            lines: BufReader::new(file).lines(),
            line: 0,
        },
    })
}

pub struct RecordIter {
    inner: Inner,
}

enum Inner {
    Buffered(std::vec::IntoIter<Record>),
    Lines {
        path: String,
        lines: Lines<BufReader<File>>,
        line: usize,
    },
}

impl Iterator for RecordIter {
    type Item = Result<Record, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Buffered(iter) => iter.next().map(Ok),
            Inner::Lines { path, lines, line } => loop {
                *line += 1;
                let text = match lines.next()? {
                    Ok(text) => text,
                    Err(source) => {
                        return Some(Err(FormatError::Read {
                            path: path.clone(),
                            source,
                        }));
                    }
                };
                if text.trim().is_empty() {
                    continue;
                }
                return Some(match serde_json::from_str::<Value>(&text) {
                    Ok(Value::Object(map)) => Ok(map),
                    Ok(_) => Err(FormatError::LineNotObject {
                        path: path.clone(),
                        line: *line,
                    }),
                    Err(source) => Err(FormatError::BadLine {
                        path: path.clone(),
                        line: *line,
                        source,
                    }),
                });
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_cloudtrail_envelope() {
        let file = write_temp(r#"{"Records": [{"eventName": "a"}, {"eventName": "b"}]}"#);
        let records = load_records(file.path(), LogFormat::CloudTrail).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["eventName"], "a");
    }

    #[test]
    fn test_cloudtrail_missing_envelope() {
        let file = write_temp(r#"{"NotRecords": []}"#);
        assert!(matches!(
            load_records(file.path(), LogFormat::CloudTrail),
            Err(FormatError::MissingRecords { .. })
        ));
    }

    #[test]
    fn test_cloudtrail_records_not_array() {
        let file = write_temp(r#"{"Records": {"a": 1}}"#);
        assert!(matches!(
            load_records(file.path(), LogFormat::CloudTrail),
            Err(FormatError::RecordsNotArray { .. })
        ));
    }

    #[test]
    fn test_flatjson_single_object() {
        let file = write_temp("  {\"a\": 1, \"b\": {\"c\": 2}}\n");
        let records = load_records(file.path(), LogFormat::FlatJson).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_ndjson_skips_blank_lines() {
        let file = write_temp("{\"a\": 1}\n\n{\"a\": 2}\n");
        let records = load_records(file.path(), LogFormat::FlatJson).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_ndjson_bad_line_is_numbered() {
        let file = write_temp("{\"a\": 1}\nnot json\n{\"a\": 3}\n");
        match load_records(file.path(), LogFormat::FlatJson) {
            Err(FormatError::BadLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected BadLine, got {:?}", other),
        }
    }

    #[test]
    fn test_probe_reports_working_format() {
        let trail = write_temp(r#"{"Records": []}"#);
        assert_eq!(probe(trail.path()), Some(LogFormat::CloudTrail));
        let flat = write_temp("{\"a\": 1}\n{\"a\": 2}\n");
        // first byte is '{' but whole file is not one object → NDJSON
        assert_eq!(probe(flat.path()), Some(LogFormat::FlatJson));
        let junk = write_temp("plainly not json");
        assert_eq!(probe(junk.path()), None);
    }
}
