pub mod extraction;
pub mod handlers;
pub mod processing;
pub mod prompts;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// The "if" half of a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

/// The "then" half of a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Unknown values fall back to `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Where a rule's guidance came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    #[default]
    Conversation,
    Document,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSource::Conversation => "conversation",
            RuleSource::Document => "document",
        }
    }

    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().to_lowercase().starts_with("document") {
            RuleSource::Document
        } else {
            RuleSource::Conversation
        }
    }
}

/// A validated rule ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRule {
    #[serde(rename = "if")]
    pub trigger: RuleTrigger,
    #[serde(rename = "then")]
    pub action: RuleAction,
    pub priority: Priority,
    pub category: String,
    pub source: RuleSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pending,
    Approved,
    Rejected,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Pending => "pending",
            RuleStatus::Approved => "approved",
            RuleStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RuleStatus::Pending),
            "approved" => Ok(RuleStatus::Approved),
            "rejected" => Ok(RuleStatus::Rejected),
            other => Err(AppError::Validation(format!("Unknown rule status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_lenient_parse() {
        assert_eq!(Priority::parse_lenient(" HIGH "), Priority::High);
        assert_eq!(Priority::parse_lenient("low"), Priority::Low);
        assert_eq!(Priority::parse_lenient("urgent"), Priority::Medium);
    }

    #[test]
    fn test_source_lenient_parse() {
        assert_eq!(RuleSource::parse_lenient("Documents"), RuleSource::Document);
        assert_eq!(RuleSource::parse_lenient("interview"), RuleSource::Conversation);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Approved".parse::<RuleStatus>().unwrap(), RuleStatus::Approved);
        assert!("archived".parse::<RuleStatus>().is_err());
    }

    #[test]
    fn test_rule_serializes_with_if_then_keys() {
        let rule = ExtractedRule {
            trigger: RuleTrigger {
                event: Some("child refuses homework".into()),
                ..Default::default()
            },
            action: RuleAction {
                action: Some("offer a short break".into()),
                ..Default::default()
            },
            priority: Priority::High,
            category: "motivation".into(),
            source: RuleSource::Conversation,
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["if"]["event"], "child refuses homework");
        assert!(value["if"].get("context").is_none());
        assert_eq!(value["then"]["action"], "offer a short break");
        assert_eq!(value["priority"], "high");
    }
}
