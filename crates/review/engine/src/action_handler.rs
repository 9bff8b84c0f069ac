//! Rule action dispatch
//!
//! Actions are a closed set dispatched with an exhaustive match. Delivery
//! of emails, questionnaires and data requests goes through a
//! [`NotificationSender`]; webhooks are posted with `reqwest`.

use crate::notification_planner::{NotificationPlanner, RecipientContext};
use crate::condition_evaluator::lookup;
use async_trait::async_trait;
use review_types::{RecipientSelector, RuleAction, RuleId};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("No deliverable recipients: {0}")]
    Recipient(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Webhook failed: {0}")]
    Webhook(String),
}

/// Where and for what an action runs
#[derive(Clone, Copy, Debug)]
pub struct ActionContext<'a> {
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub request_type: &'a str,
    pub stage: &'a str,
    pub rule_id: &'a RuleId,
    pub data: &'a Value,
    /// Approver assigned to the stage the action runs for
    pub next_approver: Option<&'a str>,
}

/// A message handed to the delivery transport
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Email {
        recipients: Vec<String>,
        template: String,
        subject: Option<String>,
        entity_id: String,
    },
    Questionnaire {
        recipients: Vec<String>,
        questionnaire_id: String,
        entity_id: String,
    },
    DataPush {
        target: String,
        payload: Value,
    },
    DataRequest {
        recipients: Vec<String>,
        fields: Vec<String>,
        entity_id: String,
    },
}

/// Delivery transport; implementations live outside the engine
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), ActionError>;
}

/// Sender that only logs, for development setups without a transport
#[derive(Clone, Debug, Default)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), ActionError> {
        let body = serde_json::to_string(&message).unwrap_or_default();
        tracing::info!(message = %body, "Outbound message");
        Ok(())
    }
}

/// Executes a single rule action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action, returning a detail payload for the action result
    async fn execute(&self, action: &RuleAction, ctx: &ActionContext<'_>) -> Result<Value, ActionError>;
}

/// Default handler: messages through a sender, webhooks over HTTP
#[derive(Clone)]
pub struct StandardActionHandler {
    sender: Arc<dyn NotificationSender>,
    planner: NotificationPlanner,
    http: reqwest::Client,
    webhook_timeout: Duration,
}

impl StandardActionHandler {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        planner: NotificationPlanner,
        webhook_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            planner,
            http: reqwest::Client::new(),
            webhook_timeout,
        }
    }

    fn recipients(
        &self,
        selectors: &[RecipientSelector],
        ctx: &ActionContext<'_>,
    ) -> Result<(Vec<String>, Vec<Value>), ActionError> {
        let recipient_ctx = RecipientContext::new(ctx.data).with_next_approver(ctx.next_approver);
        let (resolved, failures) = self.planner.resolve_recipients(selectors, &recipient_ctx);
        let failures: Vec<Value> = failures
            .iter()
            .map(|f| json!({"recipient": f.selector.to_string(), "reason": f.reason}))
            .collect();
        if resolved.is_empty() {
            return Err(ActionError::Recipient(
                failures
                    .iter()
                    .filter_map(|f| f.get("reason").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }
        Ok((resolved.into_iter().map(|r| r.address).collect(), failures))
    }

    fn select_fields(data: &Value, fields: &[String]) -> Value {
        if fields.is_empty() {
            return data.clone();
        }
        let mut out = Map::new();
        for field in fields {
            if let Some(v) = lookup(data, field) {
                out.insert(field.clone(), v.clone());
            }
        }
        Value::Object(out)
    }

    async fn post_webhook(
        &self,
        url: &str,
        method: &str,
        include_data: bool,
        ctx: &ActionContext<'_>,
    ) -> Result<Value, ActionError> {
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| ActionError::Webhook(format!("invalid method '{}': {}", method, e)))?;
        let mut body = json!({
            "entity_type": ctx.entity_type,
            "entity_id": ctx.entity_id,
            "request_type": ctx.request_type,
            "stage": ctx.stage,
            "rule_id": ctx.rule_id.0,
        });
        if include_data {
            body["data"] = ctx.data.clone();
        }

        let response = self
            .http
            .request(method, url)
            .timeout(self.webhook_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::Webhook(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Webhook(format!("{} returned {}", url, status)));
        }
        Ok(json!({"url": url, "status": status.as_u16()}))
    }
}

#[async_trait]
impl ActionHandler for StandardActionHandler {
    async fn execute(&self, action: &RuleAction, ctx: &ActionContext<'_>) -> Result<Value, ActionError> {
        match action {
            RuleAction::SendEmail {
                to,
                template,
                subject,
            } => {
                let (recipients, failures) = self.recipients(to, ctx)?;
                self.sender
                    .send(OutboundMessage::Email {
                        recipients: recipients.clone(),
                        template: template.clone(),
                        subject: subject.clone(),
                        entity_id: ctx.entity_id.to_string(),
                    })
                    .await?;
                Ok(json!({"recipients": recipients, "failures": failures}))
            }
            RuleAction::SendQuestionnaire {
                questionnaire_id,
                to,
            } => {
                let (recipients, _) = self.recipients(std::slice::from_ref(to), ctx)?;
                self.sender
                    .send(OutboundMessage::Questionnaire {
                        recipients: recipients.clone(),
                        questionnaire_id: questionnaire_id.clone(),
                        entity_id: ctx.entity_id.to_string(),
                    })
                    .await?;
                Ok(json!({"recipients": recipients, "questionnaire_id": questionnaire_id}))
            }
            RuleAction::PushData { target, fields } => {
                let payload = json!({
                    "entity_type": ctx.entity_type,
                    "entity_id": ctx.entity_id,
                    "data": Self::select_fields(ctx.data, fields),
                });
                self.sender
                    .send(OutboundMessage::DataPush {
                        target: target.clone(),
                        payload,
                    })
                    .await?;
                Ok(json!({"target": target}))
            }
            RuleAction::CollectData { from, fields } => {
                let (recipients, _) = self.recipients(std::slice::from_ref(from), ctx)?;
                self.sender
                    .send(OutboundMessage::DataRequest {
                        recipients: recipients.clone(),
                        fields: fields.clone(),
                        entity_id: ctx.entity_id.to_string(),
                    })
                    .await?;
                Ok(json!({"recipients": recipients, "fields": fields}))
            }
            RuleAction::Webhook {
                url,
                method,
                include_data,
            } => self.post_webhook(url, method, *include_data, ctx).await,
            RuleAction::SetFlag { flag, value } => Ok(json!({"flag": flag, "value": value})),
        }
    }
}
