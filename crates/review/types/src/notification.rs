//! Notification recipients and reminder schedules

use crate::ReviewError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Symbolic or literal notification target.
///
/// Serialized as a plain string: `user`, `vendor`, `next_approver`,
/// `role:<name>`, or anything else as a literal address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecipientSelector {
    /// The submitting user
    User,
    Vendor,
    /// Assignee of the step being entered
    NextApprover,
    Role(String),
    Address(String),
}

impl From<String> for RecipientSelector {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "user" => Self::User,
            "vendor" => Self::Vendor,
            "next_approver" => Self::NextApprover,
            _ => match trimmed.strip_prefix("role:") {
                Some(role) => Self::Role(role.trim().to_string()),
                None => Self::Address(trimmed.to_string()),
            },
        }
    }
}

impl From<&str> for RecipientSelector {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<RecipientSelector> for String {
    fn from(selector: RecipientSelector) -> Self {
        selector.to_string()
    }
}

impl std::fmt::Display for RecipientSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Vendor => f.write_str("vendor"),
            Self::NextApprover => f.write_str("next_approver"),
            Self::Role(role) => write!(f, "role:{}", role),
            Self::Address(addr) => f.write_str(addr),
        }
    }
}

/// A selector resolved to a concrete address or identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub selector: RecipientSelector,
    pub address: String,
}

/// A selector that could not be resolved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientFailure {
    pub selector: RecipientSelector,
    pub reason: String,
}

impl RecipientFailure {
    pub fn to_error(&self) -> ReviewError {
        ReviewError::NotificationFailure {
            recipient: self.selector.to_string(),
            reason: self.reason.clone(),
        }
    }
}

/// A scheduled reminder; firing it is up to an external scheduler
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub offset_days: i64,
    pub reminder_date: DateTime<Utc>,
    pub recipients: Vec<String>,
    /// The reminder date was already in the past when planned
    pub already_due: bool,
}

/// Recipients and reminders for a stage
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPlan {
    pub recipients: Vec<ResolvedRecipient>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecipientFailure>,
    pub reminders: Vec<Reminder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Dates that could not be computed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl NotificationPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty() && self.reminders.is_empty() && self.failures.is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.recipients.iter().map(|r| r.address.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!(RecipientSelector::from("user"), RecipientSelector::User);
        assert_eq!(
            RecipientSelector::from("next_approver"),
            RecipientSelector::NextApprover
        );
        assert_eq!(
            RecipientSelector::from("role:compliance"),
            RecipientSelector::Role("compliance".into())
        );
        assert_eq!(
            RecipientSelector::from("ops@example.com"),
            RecipientSelector::Address("ops@example.com".into())
        );
    }

    #[test]
    fn test_selector_serializes_as_string() {
        let selectors = vec![
            RecipientSelector::Vendor,
            RecipientSelector::Role("legal".into()),
        ];
        let json = serde_json::to_value(&selectors).unwrap();
        assert_eq!(json, serde_json::json!(["vendor", "role:legal"]));
        let back: Vec<RecipientSelector> = serde_json::from_value(json).unwrap();
        assert_eq!(back, selectors);
    }

    #[test]
    fn test_failure_is_non_fatal() {
        let failure = RecipientFailure {
            selector: RecipientSelector::NextApprover,
            reason: "no assignee".into(),
        };
        assert!(!failure.to_error().is_fatal());
    }
}
