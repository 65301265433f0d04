//! Integration tests for alert definitions and alert history.

use assert_matches::assert_matches;
use chrono::Utc;
use herald_core::alert::{Aggregation, Channel, Condition, ConditionLogic, HistoryStatus};
use herald_core::error::CoreError;
use herald_db::models::alert::{CreateAlert, NewAlertHistory};
use herald_db::repositories::AlertRepo;
use herald_db::StoreError;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_alert(name: &str) -> CreateAlert {
    CreateAlert {
        name: name.to_string(),
        conditions: vec![
            Condition::new("cpu_usage", Aggregation::Avg, "gt", 80.0),
            Condition::new("memory_usage", Aggregation::Avg, "gt", 70.0),
        ],
        condition_logic: ConditionLogic::Or,
        window_seconds: 300,
        cooldown_seconds: 600,
        severity: "critical".to_string(),
        channels: vec![Channel::Webhook { webhook_id: 1 }],
        enabled: None,
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn created_alert_round_trips_typed_rule(pool: PgPool) {
    let alert = AlertRepo::create(&pool, 7, &new_alert("Resource pressure"))
        .await
        .unwrap();

    assert!(alert.enabled);
    assert!(alert.last_triggered_at.is_none());

    let rule = alert.rule().unwrap();
    assert_eq!(rule.tenant_id, 7);
    assert_eq!(rule.logic, ConditionLogic::Or);
    assert_eq!(rule.conditions.len(), 2);
    assert_eq!(rule.conditions[0].metric_name, "cpu_usage");
    assert_eq!(alert.channels().unwrap(), vec![Channel::Webhook { webhook_id: 1 }]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_definitions_are_rejected_before_insert(pool: PgPool) {
    let mut input = new_alert("No conditions");
    input.conditions.clear();
    let result = AlertRepo::create(&pool, 7, &input).await;
    assert_matches!(result, Err(StoreError::Invalid(CoreError::Validation(_))));

    let mut input = new_alert("Zero window");
    input.window_seconds = 0;
    assert!(AlertRepo::create(&pool, 7, &input).await.is_err());

    assert!(AlertRepo::list_for_tenant(&pool, 7).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_enabled_spans_tenants_and_skips_disabled(pool: PgPool) {
    let a = AlertRepo::create(&pool, 1, &new_alert("a")).await.unwrap();
    let b = AlertRepo::create(&pool, 2, &new_alert("b")).await.unwrap();
    AlertRepo::set_enabled(&pool, 2, b.id, false).await.unwrap();

    let enabled = AlertRepo::list_enabled(&pool).await.unwrap();
    let ids: Vec<i64> = enabled.iter().map(|x| x.id).collect();
    assert_eq!(ids, vec![a.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enabling_without_channels_is_refused(pool: PgPool) {
    let mut input = new_alert("Silent");
    input.channels.clear();
    input.enabled = Some(false);
    let alert = AlertRepo::create(&pool, 3, &input).await.unwrap();

    let updated = AlertRepo::set_enabled(&pool, 3, alert.id, true).await.unwrap();
    assert!(updated.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn other_tenants_cannot_read_or_delete(pool: PgPool) {
    let alert = AlertRepo::create(&pool, 1, &new_alert("mine")).await.unwrap();

    assert!(AlertRepo::find_for_tenant(&pool, 2, alert.id).await.unwrap().is_none());
    assert!(!AlertRepo::delete(&pool, 2, alert.id).await.unwrap());
    assert!(AlertRepo::find_for_tenant(&pool, 1, alert.id).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn history_lifecycle_and_last_triggered(pool: PgPool) {
    let alert = AlertRepo::create(&pool, 5, &new_alert("cpu")).await.unwrap();
    let now = Utc::now();

    let history = AlertRepo::create_history(
        &pool,
        &NewAlertHistory {
            alert_id: alert.id,
            tenant_id: alert.tenant_id,
            triggered_at: now,
            metadata: serde_json::json!({"triggered": true}),
        },
    )
    .await
    .unwrap();
    assert_eq!(history.status().unwrap(), HistoryStatus::Triggered);
    assert_eq!(history.metadata["triggered"], true);

    AlertRepo::update_last_triggered(&pool, alert.id, now).await.unwrap();
    let reloaded = AlertRepo::find_for_tenant(&pool, 5, alert.id).await.unwrap().unwrap();
    let stored = reloaded.last_triggered_at.unwrap();
    assert!((stored - now).num_milliseconds().abs() < 1);

    let acked = AlertRepo::acknowledge_history(&pool, 5, history.id).await.unwrap().unwrap();
    assert_eq!(acked.status().unwrap(), HistoryStatus::Acknowledged);
    assert!(AlertRepo::acknowledge_history(&pool, 5, history.id).await.unwrap().is_none());

    let resolved = AlertRepo::resolve_history(&pool, 5, history.id).await.unwrap().unwrap();
    assert_eq!(resolved.status().unwrap(), HistoryStatus::Resolved);
    assert!(resolved.resolved_at.is_some());
    assert!(AlertRepo::resolve_history(&pool, 5, history.id).await.unwrap().is_none());

    let listed = AlertRepo::list_history(&pool, 5, alert.id, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(AlertRepo::list_history(&pool, 6, alert.id, 10).await.unwrap().is_empty());
}
