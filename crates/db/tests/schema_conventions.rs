use sqlx::PgPool;

/// Every Herald table carries `created_at` and `updated_at` as timestamptz.
#[sqlx::test(migrations = "../../db/migrations")]
async fn every_table_has_timestamptz_audit_columns(pool: PgPool) {
    let offenders: Vec<(String, String)> = sqlx::query_as(
        "SELECT t.table_name::TEXT, c.column_name::TEXT
         FROM information_schema.tables t
         CROSS JOIN (VALUES ('created_at'), ('updated_at')) AS c(column_name)
         LEFT JOIN information_schema.columns col
           ON col.table_schema = t.table_schema
          AND col.table_name = t.table_name
          AND col.column_name = c.column_name
         WHERE t.table_schema = 'public'
           AND t.table_type = 'BASE TABLE'
           AND t.table_name <> '_sqlx_migrations'
           AND (col.data_type IS NULL OR col.data_type <> 'timestamp with time zone')",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(
        offenders.is_empty(),
        "missing or non-timestamptz audit columns: {offenders:?}"
    );

    let herald_tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables
         WHERE table_schema = 'public' AND table_name IN
           ('alerts', 'alert_history', 'webhooks', 'delivery_queue', 'metric_samples')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(herald_tables, 5);
}

/// Every table gets the shared updated_at trigger.
#[sqlx::test(migrations = "../../db/migrations")]
async fn every_table_has_updated_at_trigger(pool: PgPool) {
    let missing: Vec<(String,)> = sqlx::query_as(
        "SELECT t.table_name::TEXT
         FROM information_schema.tables t
         WHERE t.table_schema = 'public'
           AND t.table_type = 'BASE TABLE'
           AND t.table_name != '_sqlx_migrations'
           AND NOT EXISTS (
               SELECT 1 FROM information_schema.triggers tr
               WHERE tr.event_object_table = t.table_name
                 AND tr.action_statement LIKE '%set_updated_at%'
           )",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(missing.is_empty(), "tables without updated_at trigger: {missing:?}");
}
