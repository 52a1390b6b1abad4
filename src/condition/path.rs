use serde_json::{Map, Value};
use std::fmt;

/// One step of a field path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A dotted field path with optional bracketed array indices,
/// e.g. `userIdentity.type` or `resources[0].ARN`.
///
/// Resolution distinguishes *absent* (the path does not exist on the
/// record) from a present JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a dotted path. Never fails: any text is a valid key lookup;
    /// a `name[3]` segment becomes a key lookup followed by an index.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                continue;
            }
            push_segment(&mut segments, part);
        }
        FieldPath {
            raw: raw.to_string(),
            segments,
        }
    }

    /// Walk the record. Returns `None` when any segment fails to resolve
    /// (missing key, index on a non-array, out-of-bounds index).
    pub fn resolve<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        let mut segments = self.segments.iter();
        let mut current = match segments.next()? {
            PathSegment::Key(key) => record.get(key)?,
            PathSegment::Index(_) => return None,
        };
        for segment in segments {
            current = match segment {
                PathSegment::Key(key) => current.as_object()?.get(key)?,
                PathSegment::Index(idx) => current.as_array()?.get(*idx)?,
            };
        }
        Some(current)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `name[0][1]` into a key lookup plus index steps. A bracket pair
/// that does not hold a plain integer is kept as part of the key.
fn push_segment(segments: &mut Vec<PathSegment>, part: &str) {
    let mut rest = part;
    let mut indices = Vec::new();
    while let Some(open) = rest.rfind('[') {
        if !rest.ends_with(']') {
            break;
        }
        match rest[open + 1..rest.len() - 1].parse::<usize>() {
            Ok(idx) => {
                indices.push(idx);
                rest = &rest[..open];
            }
            Err(_) => break,
        }
    }
    if rest.is_empty() && indices.is_empty() {
        return;
    }
    if !rest.is_empty() {
        segments.push(PathSegment::Key(rest.to_string()));
    }
    for idx in indices.into_iter().rev() {
        segments.push(PathSegment::Index(idx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn test_resolve_nested_key() {
        let rec = record(json!({"userIdentity": {"type": "IAMUser"}}));
        let path = FieldPath::parse("userIdentity.type");
        assert_eq!(path.resolve(&rec), Some(&json!("IAMUser")));
    }

    #[test]
    fn test_resolve_array_index() {
        let rec = record(json!({"resources": [{"ARN": "arn:aws:s3:::x"}]}));
        let path = FieldPath::parse("resources[0].ARN");
        assert_eq!(path.resolve(&rec), Some(&json!("arn:aws:s3:::x")));
    }

    #[test]
    fn test_missing_key_is_absent() {
        let rec = record(json!({"eventName": "ConsoleLogin"}));
        assert_eq!(FieldPath::parse("verb").resolve(&rec), None);
        assert_eq!(FieldPath::parse("eventName.deeper").resolve(&rec), None);
    }

    #[test]
    fn test_null_is_present() {
        let rec = record(json!({"errorCode": null}));
        assert_eq!(
            FieldPath::parse("errorCode").resolve(&rec),
            Some(&Value::Null)
        );
    }

    #[test]
    fn test_index_on_non_array_is_absent() {
        let rec = record(json!({"a": {"b": "c"}}));
        assert_eq!(FieldPath::parse("a[0]").resolve(&rec), None);
    }

    #[test]
    fn test_out_of_bounds_index_is_absent() {
        let rec = record(json!({"a": [1, 2]}));
        assert_eq!(FieldPath::parse("a[5]").resolve(&rec), None);
    }

    #[test]
    fn test_non_numeric_bracket_stays_in_key() {
        let rec = record(json!({"a[b]": 1}));
        assert_eq!(FieldPath::parse("a[b]").resolve(&rec), Some(&json!(1)));
    }
}
