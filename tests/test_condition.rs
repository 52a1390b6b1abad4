use serde_json::{Map, Value, json};
use trailscan::condition::{eval, parse, validate};

fn record(value: Value) -> Map<String, Value> {
    value.as_object().expect("object").clone()
}

fn holds(condition: &str, value: Value) -> bool {
    let expr = parse(condition).expect("condition parses");
    eval(&expr, &record(value))
}

#[test]
fn test_parenthesized_or_group_does_not_leak_into_and() {
    // The historical cross-format false positive: both fields absent must
    // give false for the whole conjunction.
    let rec = json!({"eventName": "PutObject", "eventSource": "s3.amazonaws.com"});
    assert!(!holds(
        "verb != '' AND (userAgent CONTAINS 'python' OR userAgent CONTAINS 'curl')",
        rec
    ));

    // Same shape with the group satisfied but the left side absent.
    let rec = json!({"userAgent": "python-requests/2.28"});
    assert!(!holds(
        "verb != '' AND (userAgent CONTAINS 'python' OR userAgent CONTAINS 'curl')",
        rec
    ));

    // And fully satisfied.
    let rec = json!({"verb": "create", "userAgent": "curl/8.0"});
    assert!(holds(
        "verb != '' AND (userAgent CONTAINS 'python' OR userAgent CONTAINS 'curl')",
        rec
    ));
}

#[test]
fn test_absence_semantics_across_all_operators() {
    let rec = json!({"present": "x"});
    let absent_false = [
        "missing = 'x'",
        "missing != 'x'",
        "missing <> 'x'",
        "missing < 5",
        "missing <= 5",
        "missing > 5",
        "missing >= 5",
        "missing IN ('x')",
        "missing NOT IN ('x')",
        "missing CONTAINS 'x'",
        "missing NOT CONTAINS 'x'",
        "missing STARTSWITH 'x'",
        "missing NOT STARTSWITH 'x'",
        "missing ENDSWITH 'x'",
        "missing NOT ENDSWITH 'x'",
        "missing MATCH '*'",
        "missing LIKE '%'",
        "missing IS NOT NULL",
    ];
    for condition in absent_false {
        assert!(
            !holds(condition, rec.clone()),
            "expected false on absent field: {}",
            condition
        );
    }
    assert!(holds("missing IS NULL", rec));
}

#[test]
fn test_double_negation_equals_original() {
    let conditions = [
        "eventName = 'ConsoleLogin'",
        "missing != 'x'",
        "count > 3 AND count < 10",
    ];
    let records = [
        json!({"eventName": "ConsoleLogin", "count": 5}),
        json!({"eventName": "Other"}),
        json!({}),
    ];
    for condition in conditions {
        let double = format!("NOT NOT {}", condition);
        for rec in &records {
            assert_eq!(
                holds(&double, rec.clone()),
                holds(condition, rec.clone()),
                "NOT NOT differs for {} on {}",
                condition,
                rec
            );
        }
    }
}

#[test]
fn test_not_contains_is_one_token_not_two() {
    // `NOT` + `CONTAINS` as separate tokens would negate a whole
    // predicate and flip the absence semantics; longest-match must win.
    let expr = parse("userAgent NOT CONTAINS 'curl'").unwrap();
    // On an absent field the bound operator yields false; a parse as
    // NOT(userAgent CONTAINS 'curl') would yield true.
    assert!(!eval(&expr, &record(json!({}))));
}

#[test]
fn test_keywords_any_case_strings_keep_case() {
    let rec = json!({"a": "MiXeD"});
    assert!(holds("a = 'MiXeD' and a != 'mixed'", rec.clone()));
    assert!(holds("a = 'MiXeD' And a CONTAINS 'XeD'", rec.clone()));
    assert!(!holds("a CONTAINS 'xed'", rec));
}

#[test]
fn test_or_precedence_matches_grouped_form() {
    let records = [
        json!({"a": 1, "b": 2, "c": 3}),
        json!({"a": 1}),
        json!({"b": 2, "c": 3}),
        json!({"c": 3}),
    ];
    for rec in records {
        assert_eq!(
            holds("a = 1 OR b = 2 AND c = 3", rec.clone()),
            holds("a = 1 OR (b = 2 AND c = 3)", rec)
        );
    }
}

#[test]
fn test_validate_flags_where_keyword() {
    let result = validate("WHERE eventName = 'x'");
    assert!(!result.valid);
    let message = result.error.unwrap();
    assert!(message.contains("WHERE"), "message was: {}", message);
}

#[test]
fn test_validate_accepts_the_readme_conditions() {
    let conditions = [
        "eventName = 'ConsoleLogin' AND responseElements.ConsoleLogin = 'Success'",
        "errorCode = 'AccessDenied' OR errorCode = 'UnauthorizedOperation'",
        "userIdentity.type = 'Root' AND eventName NOT IN ('GetSessionToken')",
        "requestParameters.bucketName ENDSWITH '-backup' AND eventName STARTSWITH 'Delete'",
    ];
    for condition in conditions {
        assert!(validate(condition).valid, "rejected: {}", condition);
    }
}

#[test]
fn test_validate_reports_positions() {
    let result = validate("eventName = 'ConsoleLogin' AND (errorCode = 'x'");
    assert!(!result.valid);
    assert_eq!(result.position, Some(31));
}

#[test]
fn test_nested_paths_and_indices_in_conditions() {
    let rec = json!({
        "userIdentity": {"sessionContext": {"attributes": {"mfaAuthenticated": "false"}}},
        "resources": [{"ARN": "arn:aws:s3:::prod-data"}]
    });
    assert!(holds(
        "userIdentity.sessionContext.attributes.mfaAuthenticated = 'false'",
        rec.clone()
    ));
    assert!(holds("resources[0].ARN STARTSWITH 'arn:aws:s3'", rec));
}
