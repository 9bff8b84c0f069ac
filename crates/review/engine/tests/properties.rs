//! Property tests for config validation, rule determinism, field hiding
//! and notification planning.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use review_engine::*;
use review_types::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_step_type() -> impl Strategy<Value = StepType> {
    prop_oneof![
        Just(StepType::Review),
        Just(StepType::Approval),
        Just(StepType::Notification),
    ]
}

/// Distinct step numbers with their types
fn arb_steps() -> impl Strategy<Value = Vec<(u32, StepType)>> {
    prop::collection::btree_set(1u32..50, 1..8).prop_flat_map(|numbers| {
        let numbers: Vec<u32> = numbers.into_iter().collect();
        let len = numbers.len();
        (Just(numbers), prop::collection::vec(arb_step_type(), len))
            .prop_map(|(numbers, types)| numbers.into_iter().zip(types).collect())
    })
}

fn arb_condition() -> impl Strategy<Value = Condition> {
    let leaf = prop_oneof![
        Just(Condition::Always),
        (0.0f64..10.0).prop_map(|v| Condition::gt("risk_score", v)),
        (0.0f64..10.0).prop_map(|v| Condition::lt("risk_score", v)),
        "[a-c]".prop_map(|v| Condition::eq("tier", v)),
        Just(Condition::exists("documents")),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Condition::all),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Condition::any),
            inner.prop_map(Condition::negate),
        ]
    })
}

fn arb_entity_data() -> impl Strategy<Value = Value> {
    (0u32..10, "[a-c]", any::<bool>()).prop_map(|(risk, tier, docs)| {
        let mut data = json!({"risk_score": risk, "tier": tier});
        if docs {
            data["documents"] = json!(["id.pdf"]);
        }
        data
    })
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

fn config_from(steps: &[(u32, StepType)]) -> WorkflowConfig {
    let lowest = steps.iter().map(|(n, _)| *n).min().unwrap();
    steps.iter().fold(WorkflowConfig::new("agent", "Generated"), |config, (n, t)| {
        let step = WorkflowStep::new(*n, *t).named(format!("stage-{}", n));
        config.with_step(if *n == lowest { step.first() } else { step })
    })
}

// ---------------------------------------------------------------------------
// Config validation
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn well_formed_configs_validate(steps in arb_steps()) {
        let config = config_from(&steps);
        prop_assert!(config.validate().is_ok());
        prop_assert_eq!(config.ordered_steps().len(), steps.len());
    }

    #[test]
    fn duplicate_step_numbers_never_validate(steps in arb_steps(), pick in any::<prop::sample::Index>()) {
        let (number, _) = steps[pick.index(steps.len())];
        let config = config_from(&steps).with_step(WorkflowStep::new(number, StepType::Review));
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn second_first_step_never_validates(steps in arb_steps()) {
        let extra = steps.iter().map(|(n, _)| *n).max().unwrap() + 1;
        let config = config_from(&steps).with_step(WorkflowStep::new(extra, StepType::Approval).first());
        prop_assert!(config.validate().is_err());
    }
}

// ---------------------------------------------------------------------------
// Rule matching
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn rule_matching_is_deterministic(
        conditions in prop::collection::vec(arb_condition(), 1..6),
        data in arb_entity_data(),
    ) {
        let (first, second) = block_on(async {
            let engine = ReviewOrchestrator::builder(EngineConfig::default()).build();
            for (i, condition) in conditions.into_iter().enumerate() {
                engine
                    .add_rule(Rule::new(format!("rule-{}", i), "agent", "review", condition))
                    .await
                    .unwrap();
            }
            let request = RuleEvaluationRequest::new("agent", "agent-1", data, "agent", "review").advisory();
            let first = engine.evaluate_rules(&request).await.unwrap();
            let second = engine.evaluate_rules(&request).await.unwrap();
            (first, second)
        });
        prop_assert_eq!(first.matched_rule_ids(), second.matched_rule_ids());
        prop_assert_eq!(first.matched_rules, second.matched_rules);
        prop_assert!(first.action_results.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Field hiding
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn hidden_fields_never_appear(
        fields in prop::collection::btree_set("[a-z]{3,8}", 1..12),
        hidden_mask in prop::collection::vec(any::<bool>(), 12),
        visible_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let fields: Vec<String> = fields.into_iter().collect();
        let hidden: HashSet<&str> = fields
            .iter()
            .zip(&hidden_mask)
            .filter(|(_, h)| **h)
            .map(|(f, _)| f.as_str())
            .collect();
        let visible: Vec<String> = fields
            .iter()
            .zip(&visible_mask)
            .filter(|(_, v)| **v)
            .map(|(f, _)| f.clone())
            .collect();

        let mut catalog = InMemoryLayoutCatalog::new();
        let (left, right) = fields.split_at(fields.len() / 2);
        catalog.register(
            Layout::new("generated")
                .with_section(LayoutSection::new("a", 2, left.to_vec()))
                .with_section(LayoutSection::new("b", 1, right.to_vec())),
        );
        catalog.bind(LayoutBinding::new("generated", "agent", "*")).unwrap();

        let mut rules = vec![PermissionRule::new("*", "*", "*", FieldPermission::EDITABLE)];
        rules.extend(hidden.iter().map(|f| PermissionRule::new("agent", *f, "*", FieldPermission::HIDDEN)));
        let generator = ViewStructureGenerator::new(
            Arc::new(catalog),
            Arc::new(StaticPermissionResolver::new(rules)),
        );

        let settings = StageSettings::default().with_visible_fields(visible.clone());
        let view = generator
            .generate(&ViewRequest::new("agent", "agent", "review").for_role("analyst"), Some(&settings), None)
            .unwrap();

        for field in &view.fields {
            prop_assert!(!hidden.contains(field.name.as_str()));
            if !visible.is_empty() {
                prop_assert!(visible.contains(&field.name));
            }
        }
        let orders: Vec<u32> = view.sections.iter().map(|s| s.order).collect();
        let expected: Vec<u32> = (1..=view.sections.len() as u32).collect();
        prop_assert_eq!(orders, expected);
        prop_assert!(view.sections.iter().all(|s| !s.fields.is_empty()));
    }
}

// ---------------------------------------------------------------------------
// Notification planning
// ---------------------------------------------------------------------------

fn planner() -> NotificationPlanner {
    NotificationPlanner::new(Arc::new(EntityDataRecipientResolver::default()), 5)
}

proptest! {
    #[test]
    fn reminders_follow_distinct_offsets(
        offsets in prop::collection::vec(-5i64..30, 0..10),
        due_day in 1u32..28,
    ) {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        let due = Utc.with_ymd_and_hms(2026, 7, due_day, 0, 0, 0).unwrap();
        let data = json!({"due_date": due.to_rfc3339(), "email": "u@example.com"});
        let notifications = EmailNotifications {
            enabled: true,
            recipients: vec![RecipientSelector::User],
            reminders: offsets.clone(),
        };

        let plan = planner().plan(Some(&notifications), None, &RecipientContext::new(&data), now);

        let mut seen = HashSet::new();
        let distinct: Vec<i64> = offsets.into_iter().filter(|o| seen.insert(*o)).collect();
        prop_assert_eq!(plan.reminders.len(), distinct.len());
        for (reminder, offset) in plan.reminders.iter().zip(&distinct) {
            prop_assert_eq!(reminder.offset_days, *offset);
            prop_assert_eq!(reminder.reminder_date, due - Duration::days(*offset));
            prop_assert_eq!(reminder.already_due, reminder.reminder_date < now);
            prop_assert_eq!(&reminder.recipients, &vec!["u@example.com".to_string()]);
        }
    }

    #[test]
    fn recipients_dedup_case_insensitively(
        picks in prop::collection::vec((0usize..4, any::<bool>()), 1..12),
    ) {
        let pool = ["ann@example.com", "bob@example.com", "cy@example.com", "di@example.com"];
        let selectors: Vec<RecipientSelector> = picks
            .iter()
            .map(|(i, upper)| {
                let address = if *upper { pool[*i].to_uppercase() } else { pool[*i].to_string() };
                RecipientSelector::Address(address)
            })
            .collect();

        let data = json!({});
        let (recipients, failures) = planner().resolve_recipients(&selectors, &RecipientContext::new(&data));
        prop_assert!(failures.is_empty());

        let mut seen = HashSet::new();
        let expected: Vec<usize> = picks.iter().map(|(i, _)| *i).filter(|i| seen.insert(*i)).collect();
        prop_assert_eq!(recipients.len(), expected.len());
        for (recipient, index) in recipients.iter().zip(expected) {
            prop_assert_eq!(recipient.address.to_lowercase(), pool[index]);
        }
    }
}
