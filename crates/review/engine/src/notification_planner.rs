//! Notification and reminder planner
//!
//! Computes who is told about a stage and when reminders are due. Nothing
//! is sent from here; firing reminders belongs to an external scheduler.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use review_types::{
    EmailNotifications, NotificationPlan, RecipientFailure, RecipientSelector, Reminder,
    ResolvedRecipient,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::condition_evaluator::lookup;

/// What the planner knows about the entity and the stage being entered
#[derive(Clone, Copy, Debug)]
pub struct RecipientContext<'a> {
    pub data: &'a Value,
    /// Assignee of the step being entered
    pub next_approver: Option<&'a str>,
    pub acting_role: Option<&'a str>,
    pub target_role: Option<&'a str>,
}

impl<'a> RecipientContext<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self {
            data,
            next_approver: None,
            acting_role: None,
            target_role: None,
        }
    }

    pub fn with_next_approver(mut self, approver: Option<&'a str>) -> Self {
        self.next_approver = approver;
        self
    }
}

/// Turns a selector into concrete addresses
pub trait RecipientResolver: Send + Sync {
    fn resolve(
        &self,
        selector: &RecipientSelector,
        ctx: &RecipientContext<'_>,
    ) -> Result<Vec<String>, String>;
}

/// Entity data paths consulted for symbolic selectors, first match wins
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecipientFields {
    #[serde(default = "default_user_fields")]
    pub user: Vec<String>,
    #[serde(default = "default_vendor_fields")]
    pub vendor: Vec<String>,
}

fn default_user_fields() -> Vec<String> {
    vec!["user.email".into(), "submitted_by_email".into(), "email".into()]
}

fn default_vendor_fields() -> Vec<String> {
    vec!["vendor.email".into(), "vendor_email".into()]
}

impl Default for RecipientFields {
    fn default() -> Self {
        Self {
            user: default_user_fields(),
            vendor: default_vendor_fields(),
        }
    }
}

/// Resolves selectors from entity data and a role directory
#[derive(Clone, Debug, Default)]
pub struct EntityDataRecipientResolver {
    fields: RecipientFields,
    roles: HashMap<String, Vec<String>>,
}

impl EntityDataRecipientResolver {
    pub fn new(fields: RecipientFields) -> Self {
        Self {
            fields,
            roles: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>, members: Vec<String>) -> Self {
        self.roles.insert(role.into(), members);
        self
    }

    pub fn with_roles(mut self, roles: HashMap<String, Vec<String>>) -> Self {
        self.roles.extend(roles);
        self
    }

    fn first_string(data: &Value, paths: &[String]) -> Option<String> {
        paths.iter().find_map(|p| {
            lookup(data, p)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

impl RecipientResolver for EntityDataRecipientResolver {
    fn resolve(
        &self,
        selector: &RecipientSelector,
        ctx: &RecipientContext<'_>,
    ) -> Result<Vec<String>, String> {
        match selector {
            RecipientSelector::User => Self::first_string(ctx.data, &self.fields.user)
                .map(|a| vec![a])
                .ok_or_else(|| "entity data has no submitting user address".to_string()),
            RecipientSelector::Vendor => Self::first_string(ctx.data, &self.fields.vendor)
                .map(|a| vec![a])
                .ok_or_else(|| "entity data has no vendor address".to_string()),
            RecipientSelector::NextApprover => ctx
                .next_approver
                .filter(|a| !a.trim().is_empty())
                .map(|a| vec![a.to_string()])
                .ok_or_else(|| "no next approver assigned".to_string()),
            RecipientSelector::Role(role) => self
                .roles
                .get(role)
                .filter(|members| !members.is_empty())
                .cloned()
                .ok_or_else(|| format!("role '{}' has no members", role)),
            RecipientSelector::Address(address) => {
                if address.is_empty() {
                    Err("empty address".to_string())
                } else {
                    Ok(vec![address.clone()])
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct NotificationPlanner {
    resolver: Arc<dyn RecipientResolver>,
    default_sla_days: u32,
}

impl NotificationPlanner {
    pub fn new(resolver: Arc<dyn RecipientResolver>, default_sla_days: u32) -> Self {
        Self {
            resolver,
            default_sla_days,
        }
    }

    /// Resolve selectors, dropping case-insensitive duplicates
    pub fn resolve_recipients(
        &self,
        selectors: &[RecipientSelector],
        ctx: &RecipientContext<'_>,
    ) -> (Vec<ResolvedRecipient>, Vec<RecipientFailure>) {
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        let mut failures = Vec::new();
        for selector in selectors {
            match self.resolver.resolve(selector, ctx) {
                Ok(addresses) => {
                    for address in addresses {
                        if seen.insert(address.trim().to_lowercase()) {
                            recipients.push(ResolvedRecipient {
                                selector: selector.clone(),
                                address,
                            });
                        }
                    }
                }
                Err(reason) => {
                    tracing::debug!(selector = %selector, reason = %reason, "Recipient unresolved");
                    failures.push(RecipientFailure {
                        selector: selector.clone(),
                        reason,
                    });
                }
            }
        }
        (recipients, failures)
    }

    /// Plan recipients and reminders for a stage.
    ///
    /// Absent or disabled notifications produce an empty plan.
    pub fn plan(
        &self,
        notifications: Option<&EmailNotifications>,
        step_due_in_days: Option<u32>,
        ctx: &RecipientContext<'_>,
        now: DateTime<Utc>,
    ) -> NotificationPlan {
        let notifications = match notifications {
            Some(n) if n.enabled => n,
            _ => return NotificationPlan::empty(),
        };

        let (recipients, failures) = self.resolve_recipients(&notifications.recipients, ctx);
        let addresses: Vec<String> = recipients.iter().map(|r| r.address.clone()).collect();
        let mut warnings = Vec::new();

        let Some(due_date) = self.due_date(ctx.data, step_due_in_days, now) else {
            tracing::warn!(due_in_days = ?step_due_in_days, "Due date out of range; no reminders planned");
            warnings.push("due date out of range; no reminders planned".to_string());
            return NotificationPlan {
                recipients,
                failures,
                reminders: Vec::new(),
                due_date: None,
                warnings,
            };
        };

        let mut offsets = HashSet::new();
        let mut reminders = Vec::new();
        for offset in notifications.reminders.iter().filter(|o| offsets.insert(**o)) {
            let Some(reminder_date) = Duration::try_days(*offset)
                .and_then(|delta| due_date.checked_sub_signed(delta))
            else {
                tracing::warn!(offset_days = offset, "Reminder offset out of range");
                warnings.push(format!("reminder offset {} days is out of range", offset));
                continue;
            };
            reminders.push(Reminder {
                offset_days: *offset,
                reminder_date,
                recipients: addresses.clone(),
                already_due: reminder_date < now,
            });
        }

        NotificationPlan {
            recipients,
            failures,
            reminders,
            due_date: Some(due_date),
            warnings,
        }
    }

    /// `due_date` from entity data, else the step SLA, else the default SLA.
    ///
    /// `None` when the SLA pushes the date past what a timestamp can hold.
    pub fn due_date(
        &self,
        data: &Value,
        step_due_in_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if let Some(raw) = data.get("due_date").and_then(Value::as_str) {
            match parse_due_date(raw) {
                Some(due) => return Some(due),
                None => tracing::warn!(due_date = %raw, "Unparseable due_date; using SLA"),
            }
        }
        let days = step_due_in_days.unwrap_or(self.default_sla_days);
        Duration::try_days(i64::from(days)).and_then(|delta| now.checked_add_signed(delta))
    }
}

/// RFC 3339 timestamp or `YYYY-MM-DD` (midnight UTC)
pub fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
