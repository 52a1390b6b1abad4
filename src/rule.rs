use crate::condition::{self, ConditionError, FieldPath};
use crate::ingest::Record;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder regex"));

/// A persisted detection rule (one YAML file in the rule store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub status: RuleStatus,
    pub date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub detection: Detection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<RuleOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub severity: Severity,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
}

/// Threshold-over-window qualifier: fire only when enough matches land
/// inside one sliding window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub enabled: bool,
    pub window: String,
    pub threshold: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Disabled,
    Experimental,
    Deprecated,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Disabled => "disabled",
            RuleStatus::Experimental => "experimental",
            RuleStatus::Deprecated => "deprecated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule field '{0}' must not be empty")]
    MissingField(&'static str),

    #[error("Rule date '{0}' is not an ISO date (YYYY-MM-DD)")]
    BadDate(String),

    #[error("Aggregation window '{0}' is invalid; expected <int><s|m|h|d>, e.g. 5m")]
    BadWindow(String),

    #[error("Aggregation threshold '{0}' is invalid; expected '<op> <n>' with op one of > >= < <= =")]
    BadThreshold(String),

    #[error("Condition does not parse: {0}")]
    Condition(#[from] ConditionError),
}

impl Rule {
    /// Schema validation: required fields present, enums/date/window/
    /// threshold well-formed, condition parses.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.title.trim().is_empty() {
            return Err(RuleError::MissingField("title"));
        }
        if self.description.trim().is_empty() {
            return Err(RuleError::MissingField("description"));
        }
        if self.author.trim().is_empty() {
            return Err(RuleError::MissingField("author"));
        }
        if self.date.trim().is_empty() {
            return Err(RuleError::MissingField("date"));
        }
        if NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").is_err() {
            return Err(RuleError::BadDate(self.date.clone()));
        }
        if self.detection.condition.trim().is_empty() {
            return Err(RuleError::MissingField("detection.condition"));
        }
        condition::parse(&self.detection.condition)?;
        if let Some(aggregation) = &self.detection.aggregation {
            Window::parse(&aggregation.window)?;
            Threshold::parse(&aggregation.threshold)?;
        }
        Ok(())
    }

    /// Assign a fresh UUID when the id is empty (import of id-less rules).
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Render `output.alert_title`, substituting `{{dotted.path}}`
    /// placeholders from the record. Unresolvable paths become empty.
    pub fn render_alert_title(&self, record: &Record) -> Option<String> {
        let template = self.output.as_ref()?.alert_title.as_deref()?;
        Some(render_template(template, record))
    }
}

pub fn render_template(template: &str, record: &Record) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            FieldPath::parse(caps[1].trim())
                .resolve(record)
                .map(placeholder_text)
                .unwrap_or_default()
        })
        .into_owned()
}

fn placeholder_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parsed `<int><s|m|h|d>` aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub magnitude: u64,
    pub unit: WindowUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Window {
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let trimmed = text.trim();
        let (digits, unit) = trimmed.split_at(trimmed.len().saturating_sub(1));
        let unit = match unit {
            "s" => WindowUnit::Seconds,
            "m" => WindowUnit::Minutes,
            "h" => WindowUnit::Hours,
            "d" => WindowUnit::Days,
            _ => return Err(RuleError::BadWindow(text.to_string())),
        };
        let magnitude: u64 = digits
            .parse()
            .map_err(|_| RuleError::BadWindow(text.to_string()))?;
        if magnitude == 0 {
            return Err(RuleError::BadWindow(text.to_string()));
        }
        Ok(Window { magnitude, unit })
    }

    pub fn as_seconds(&self) -> i64 {
        let unit = match self.unit {
            WindowUnit::Seconds => 1,
            WindowUnit::Minutes => 60,
            WindowUnit::Hours => 3600,
            WindowUnit::Days => 86400,
        };
        self.magnitude as i64 * unit
    }
}

/// Parsed `<op> <n>` aggregation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub op: ThresholdOp,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Threshold {
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let bad = || RuleError::BadThreshold(text.to_string());
        let mut parts = text.trim().split_whitespace();
        let op = match parts.next().ok_or_else(bad)? {
            ">" => ThresholdOp::Gt,
            ">=" => ThresholdOp::Ge,
            "<" => ThresholdOp::Lt,
            "<=" => ThresholdOp::Le,
            "=" => ThresholdOp::Eq,
            _ => return Err(bad()),
        };
        let count: u64 = parts
            .next()
            .ok_or_else(bad)?
            .parse()
            .map_err(|_| bad())?;
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Threshold { op, count })
    }

    pub fn satisfied_by(&self, observed: usize) -> bool {
        let observed = observed as u64;
        match self.op {
            ThresholdOp::Gt => observed > self.count,
            ThresholdOp::Ge => observed >= self.count,
            ThresholdOp::Lt => observed < self.count,
            ThresholdOp::Le => observed <= self.count,
            ThresholdOp::Eq => observed == self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_rule() -> Rule {
        Rule {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            title: "Console login".to_string(),
            description: "Detects console logins".to_string(),
            author: "SOC Team".to_string(),
            status: RuleStatus::Active,
            date: "2026-01-05".to_string(),
            tags: vec!["aws".to_string()],
            detection: Detection {
                severity: Severity::High,
                condition: "eventName = 'ConsoleLogin'".to_string(),
                aggregation: None,
            },
            output: None,
        }
    }

    #[test]
    fn test_valid_rule_passes() {
        assert!(sample_rule().validate().is_ok());
    }

    #[test]
    fn test_empty_title_fails() {
        let mut rule = sample_rule();
        rule.title = "  ".to_string();
        assert!(matches!(
            rule.validate(),
            Err(RuleError::MissingField("title"))
        ));
    }

    #[test]
    fn test_bad_date_fails() {
        let mut rule = sample_rule();
        rule.date = "05/01/2026".to_string();
        assert!(matches!(rule.validate(), Err(RuleError::BadDate(_))));
    }

    #[test]
    fn test_bad_condition_fails() {
        let mut rule = sample_rule();
        rule.detection.condition = "eventName =".to_string();
        assert!(matches!(rule.validate(), Err(RuleError::Condition(_))));
    }

    #[test]
    fn test_aggregation_is_validated_even_when_disabled() {
        let mut rule = sample_rule();
        rule.detection.aggregation = Some(Aggregation {
            enabled: false,
            window: "5x".to_string(),
            threshold: "> 10".to_string(),
        });
        assert!(matches!(rule.validate(), Err(RuleError::BadWindow(_))));
    }

    #[test]
    fn test_window_parsing() {
        assert_eq!(
            Window::parse("5m").unwrap(),
            Window {
                magnitude: 5,
                unit: WindowUnit::Minutes
            }
        );
        assert_eq!(Window::parse("2h").unwrap().as_seconds(), 7200);
        assert_eq!(Window::parse("1d").unwrap().as_seconds(), 86400);
        assert!(Window::parse("m5").is_err());
        assert!(Window::parse("0s").is_err());
        assert!(Window::parse("5").is_err());
    }

    #[test]
    fn test_threshold_parsing() {
        let t = Threshold::parse("> 10").unwrap();
        assert!(t.satisfied_by(11));
        assert!(!t.satisfied_by(10));
        assert!(Threshold::parse(">= 3").unwrap().satisfied_by(3));
        assert!(Threshold::parse("= 2").unwrap().satisfied_by(2));
        assert!(Threshold::parse("< 2").unwrap().satisfied_by(1));
        assert!(Threshold::parse("== 2").is_err());
        assert!(Threshold::parse("> ten").is_err());
        assert!(Threshold::parse("> 1 2").is_err());
    }

    #[test]
    fn test_ensure_id_fills_empty_only() {
        let mut rule = sample_rule();
        rule.id = String::new();
        rule.ensure_id();
        assert!(!rule.id.is_empty());
        let kept = rule.id.clone();
        rule.ensure_id();
        assert_eq!(rule.id, kept);
    }

    #[test]
    fn test_alert_title_rendering() {
        let mut rule = sample_rule();
        rule.output = Some(RuleOutput {
            alert_title: Some("Brute force from {{sourceIPAddress}} ({{missing.path}})".to_string()),
        });
        let record = json!({"sourceIPAddress": "203.0.113.9"})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(
            rule.render_alert_title(&record).unwrap(),
            "Brute force from 203.0.113.9 ()"
        );
    }

    #[test]
    fn test_yaml_round_trip() {
        let rule = sample_rule();
        let yaml = serde_yaml::to_string(&rule).unwrap();
        let back: Rule = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(rule, back);
    }
}
