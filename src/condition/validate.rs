use super::error::ConditionError;
use super::parser::parse;
use serde::Serialize;

/// Outcome of validating a condition string in isolation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult {
            valid: true,
            error: None,
            position: None,
            suggestions: Vec::new(),
        }
    }
}

const OPERATOR_LIST: &str = "=, !=, <>, <, <=, >, >=, IN, NOT IN, CONTAINS, NOT CONTAINS, \
     STARTSWITH, NOT STARTSWITH, ENDSWITH, NOT ENDSWITH, MATCH, LIKE, IS NULL, IS NOT NULL";

/// Validate a condition string, returning a human-readable diagnostic with
/// the character offset and fix suggestions on failure.
pub fn validate(condition: &str) -> ValidationResult {
    match parse(condition) {
        Ok(_) => ValidationResult::ok(),
        Err(err) => ValidationResult {
            valid: false,
            position: err.offset(),
            suggestions: suggestions_for(&err),
            error: Some(err.to_string()),
        },
    }
}

fn suggestions_for(err: &ConditionError) -> Vec<String> {
    match err {
        ConditionError::Empty => {
            vec!["Provide a boolean expression, e.g. eventName = 'ConsoleLogin'".to_string()]
        }
        ConditionError::UnbalancedParens { .. } => {
            vec!["Check that every '(' has a matching ')'".to_string()]
        }
        ConditionError::UnterminatedString { .. } => vec![
            "Close the string with a single quote".to_string(),
            "Use '' inside a string for a literal quote".to_string(),
        ],
        ConditionError::UnknownOperator { .. } => {
            vec![format!("Supported operators: {}", OPERATOR_LIST)]
        }
        ConditionError::ExpectedPath { .. } => {
            vec!["Each comparison starts with a field path, e.g. userIdentity.type".to_string()]
        }
        ConditionError::ExpectedLiteral { .. } => vec![
            "String literals use single quotes: field = 'value'".to_string(),
            "Numbers and true/false are written bare: count > 10".to_string(),
        ],
        ConditionError::ExpectedOperator { path, .. } => {
            vec![format!("Follow '{}' with an operator, e.g. {} = 'value'", path, path)]
        }
        ConditionError::TrailingOperator { operator, .. } => {
            vec![format!("Operator '{}' needs a right-hand value", operator)]
        }
        ConditionError::EmptyInList { .. } => {
            vec!["Provide at least one value: field IN ('a', 'b')".to_string()]
        }
        ConditionError::TrailingInput { .. } => {
            vec!["Join clauses with AND / OR".to_string()]
        }
        ConditionError::SqlKeyword { keyword, .. } => vec![
            format!(
                "Conditions are bare boolean expressions; drop '{}' and any other SQL framing",
                keyword
            ),
            "For full SQL over a log file, use the query command instead".to_string(),
        ],
        ConditionError::TooDeep { max } => {
            vec![format!("Flatten the expression below {} nesting levels", max)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_condition_has_no_message() {
        let result = validate("eventName = 'ConsoleLogin' AND errorCode IS NULL");
        assert!(result.valid);
        assert!(result.error.is_none());
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn test_where_diagnostic_names_the_keyword() {
        let result = validate("WHERE eventName = 'x'");
        assert!(!result.valid);
        assert!(result.error.as_deref().unwrap().contains("WHERE"));
        assert_eq!(result.position, Some(0));
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_unbalanced_parens_reports_offset() {
        let result = validate("(a = 1 AND (b = 2)");
        assert!(!result.valid);
        assert_eq!(result.position, Some(0));
    }

    #[test]
    fn test_unknown_operator_lists_operators() {
        let result = validate("a BETWEEN 1");
        assert!(!result.valid);
        assert!(result.suggestions[0].contains("CONTAINS"));
    }
}
