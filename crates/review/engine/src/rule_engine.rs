//! Rule evaluation engine
//!
//! Candidate rules are the engine-wide rules in declared order followed by
//! the workflow's trigger rules in declared order. Matching is pure; side
//! effects happen only in the action phase, where every action is isolated,
//! time-bounded and de-duplicated by an idempotency key.

use crate::action_handler::{ActionContext, ActionHandler};
use crate::condition_evaluator::{ConditionEvaluator, CONTEXT_KEY};
use review_types::{
    ActionResult, ActionStatus, ReviewResult, Rule, RuleAction, RuleEvaluationRequest,
    RuleEvaluationResult, RuleId, RuleResult,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

// ── Idempotency ──────────────────────────────────────────────────────

const DEFAULT_KEY_TTL: Duration = Duration::from_secs(86_400);
const DEFAULT_KEY_CAPACITY: usize = 10_000;

/// Remembers which side-effecting actions already ran.
///
/// Keys expire after `ttl`; past `capacity` the oldest key is evicted.
#[derive(Debug)]
pub struct IdempotencyGuard {
    claimed: Mutex<Claims>,
    ttl: Duration,
    capacity: usize,
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::bounded(DEFAULT_KEY_TTL, DEFAULT_KEY_CAPACITY)
    }
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(ttl: Duration, capacity: usize) -> Self {
        Self {
            claimed: Mutex::new(Claims::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// BLAKE3 over entity, instance, stage, step, rule, action index and data
    pub fn key(request: &RuleEvaluationRequest, rule_id: &RuleId, action_index: usize, data: &Value) -> String {
        let instance = request.instance_id.as_ref().map(|id| id.0.as_str()).unwrap_or("");
        let mut hasher = blake3::Hasher::new();
        for part in [
            request.entity_type.as_str(),
            request.entity_id.as_str(),
            instance,
            request.workflow_stage.as_str(),
            rule_id.0.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        let step = request.step_number.map(u64::from).unwrap_or(u64::MAX);
        hasher.update(&step.to_le_bytes());
        hasher.update(&(action_index as u64).to_le_bytes());
        hasher.update(&serde_json::to_vec(data).unwrap_or_default());
        hasher.finalize().to_hex().to_string()
    }

    /// Returns false when the key was already claimed and has not expired
    pub async fn claim(&self, key: &str) -> bool {
        let mut claims = self.claimed.lock().await;
        let now = Instant::now();
        let ttl = self.ttl;
        claims.keys.retain(|_, (at, _)| now.duration_since(*at) < ttl);
        if claims.keys.contains_key(key) {
            return false;
        }

        while claims.keys.len() >= self.capacity {
            let Some(oldest) = claims
                .keys
                .iter()
                .min_by_key(|(_, (_, seq))| *seq)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            tracing::debug!(key = %oldest, "Evicting idempotency key");
            claims.keys.remove(&oldest);
        }
        claims.next_seq += 1;
        let seq = claims.next_seq;
        claims.keys.insert(key.to_string(), (now, seq));
        true
    }

    /// Forget a key so a later retry may run the action
    pub async fn release(&self, key: &str) {
        self.claimed.lock().await.keys.remove(key);
    }

    pub async fn claimed_count(&self) -> usize {
        self.claimed.lock().await.keys.len()
    }
}

/// Claimed keys with their claim time and insertion order
#[derive(Debug, Default)]
struct Claims {
    keys: HashMap<String, (Instant, u64)>,
    next_seq: u64,
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct RuleEngine {
    rules: RwLock<Vec<Rule>>,
    handler: Arc<dyn ActionHandler>,
    guard: Arc<IdempotencyGuard>,
    action_timeout: Duration,
}

impl RuleEngine {
    pub fn new(handler: Arc<dyn ActionHandler>, action_timeout: Duration) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            handler,
            guard: Arc::new(IdempotencyGuard::new()),
            action_timeout,
        }
    }

    /// Append an engine-wide rule
    pub async fn add_rule(&self, rule: Rule) -> ReviewResult<()> {
        rule.validate()?;
        tracing::info!(rule_id = %rule.id, stage = %rule.workflow_stage, "Rule registered");
        self.rules.write().await.push(rule);
        Ok(())
    }

    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.read().await.clone()
    }

    pub fn with_idempotency(mut self, guard: IdempotencyGuard) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn idempotency(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// Evaluate engine rules then `trigger_rules` for the request's stage.
    ///
    /// Never fails: condition errors and action failures are recorded in
    /// the result.
    pub async fn evaluate(
        &self,
        request: &RuleEvaluationRequest,
        trigger_rules: &[Rule],
    ) -> RuleEvaluationResult {
        let engine_rules = self.rules.read().await.clone();
        let data = with_context(request);
        let mut result = RuleEvaluationResult::default();

        let candidates = engine_rules
            .iter()
            .chain(trigger_rules.iter())
            .filter(|r| r.applies_to(&request.entity_type, &request.workflow_stage));

        for rule in candidates {
            let inputs = ConditionEvaluator::inputs(&rule.condition, &data);
            let (matched, error) = match ConditionEvaluator::evaluate(&rule.condition, &data) {
                Ok(m) => (m, None),
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "Rule condition failed");
                    (false, Some(e.to_string()))
                }
            };
            let executed = matched && rule.auto_execute && request.auto_execute;

            if matched {
                result.matched_rules += 1;
            }
            result.rule_results.push(RuleResult {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                matched,
                executed,
                inputs,
                error,
            });

            if executed {
                self.run_actions(rule, request, &data, &mut result).await;
            }
        }

        tracing::debug!(
            entity_id = %request.entity_id,
            stage = %request.workflow_stage,
            matched = result.matched_rules,
            "Rules evaluated"
        );
        result
    }

    async fn run_actions(
        &self,
        rule: &Rule,
        request: &RuleEvaluationRequest,
        data: &Value,
        result: &mut RuleEvaluationResult,
    ) {
        let ctx = ActionContext {
            entity_type: &request.entity_type,
            entity_id: &request.entity_id,
            request_type: &request.request_type,
            stage: &request.workflow_stage,
            rule_id: &rule.id,
            data: &request.entity_data,
            next_approver: request.next_approver.as_deref(),
        };

        for (index, action) in rule.actions.iter().enumerate() {
            let key = action.is_side_effecting().then(|| {
                IdempotencyGuard::key(request, &rule.id, index, data)
            });

            let mut outcome = ActionResult {
                rule_id: rule.id.clone(),
                action_index: index,
                action: action.name(),
                status: ActionStatus::Succeeded,
                idempotency_key: key.clone(),
                detail: None,
                error: None,
            };

            if let Some(key) = &key {
                if !self.guard.claim(key).await {
                    outcome.status = ActionStatus::Duplicate;
                    result.action_results.push(outcome);
                    continue;
                }
            }

            match tokio::time::timeout(self.action_timeout, self.handler.execute(action, &ctx)).await
            {
                Ok(Ok(detail)) => {
                    if let RuleAction::SetFlag { flag, value } = action {
                        result.flags.insert(flag.clone(), value.clone());
                    }
                    outcome.detail = Some(detail);
                }
                Ok(Err(e)) => {
                    tracing::warn!(rule_id = %rule.id, action = %outcome.action, error = %e, "Action failed");
                    if let Some(key) = &key {
                        self.guard.release(key).await;
                    }
                    outcome.status = ActionStatus::Failed;
                    outcome.error = Some(e.to_string());
                }
                Err(_) => {
                    // The action may still have landed, so the key stays claimed.
                    tracing::warn!(rule_id = %rule.id, action = %outcome.action, "Action timed out");
                    outcome.status = ActionStatus::TimedOut;
                    outcome.error = Some(format!(
                        "timed out after {} ms",
                        self.action_timeout.as_millis()
                    ));
                }
            }
            result.action_results.push(outcome);
        }
    }
}

/// Entity data plus a `_context` object describing where evaluation runs
fn with_context(request: &RuleEvaluationRequest) -> Value {
    let mut data: Map<String, Value> = request.entity_data.as_object().cloned().unwrap_or_default();
    data.insert(
        CONTEXT_KEY.to_string(),
        json!({
            "entity_type": request.entity_type,
            "entity_id": request.entity_id,
            "request_type": request.request_type,
            "stage": request.workflow_stage,
        }),
    );
    Value::Object(data)
}
