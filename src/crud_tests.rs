use super::*;
use crate::backend::MemoryBackend;

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn service(backend: Arc<MemoryBackend>) -> CrudService {
    let registry = TableRegistry::from_names(["mast_status", "mast_zone", "mast_place"]);
    CrudService::new(Arc::new(registry), backend)
}

fn status_backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new().with_table(
        "mast_status",
        vec![ColumnDescriptor::text("status_code").primary_key(), ColumnDescriptor::text("label")],
    ))
}

fn zone_backend(rows: usize) -> Arc<MemoryBackend> {
    let backend = MemoryBackend::new().with_table(
        "mast_zone",
        vec![ColumnDescriptor::serial("zone_id", "mast_zone").primary_key(), ColumnDescriptor::text("zone_name").not_null()],
    );
    for i in 1..=rows {
        backend.seed_row("mast_zone", row(&[("zone_id", Value::Int(i as i64)), ("zone_name", text(&format!("Zone {}", i)))]));
    }
    Arc::new(backend)
}

#[tokio::test]
async fn disallowed_tables_never_reach_the_backend() {
    let backend = status_backend();
    let svc = service(backend.clone());
    let body = row(&[("label", text("x"))]);
    for table in [None, Some("pg_shadow"), Some("mast_status; --"), Some("MAST_STATUS")] {
        assert_eq!(svc.list(table, &ListParams::default()).await.unwrap_err().http_status(), 400);
        assert_eq!(svc.schema(table).await.unwrap_err().http_status(), 400);
        assert_eq!(svc.create(table, &body).await.unwrap_err().http_status(), 400);
        assert_eq!(svc.update(table, Some("A"), &body).await.unwrap_err().http_status(), 400);
        assert_eq!(svc.delete(table, Some("A")).await.unwrap_err().http_status(), 400);
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn status_scenario_with_key_rename() {
    let backend = status_backend();
    let svc = service(backend.clone());

    let created = svc
        .create(Some("mast_status"), &row(&[("status_code", text("A")), ("label", text("Active"))]))
        .await
        .unwrap();
    assert_eq!(created, row(&[("status_code", text("A")), ("label", text("Active"))]));

    let updated = svc
        .update(Some("mast_status"), Some("A"), &row(&[("status_code", text("B")), ("label", text("Active"))]))
        .await
        .unwrap();
    assert_eq!(updated["status_code"], text("B"));

    let err = svc.delete(Some("mast_status"), Some("A")).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
    assert_eq!(err.message(), "No row in mast_status where status_code = A");

    svc.delete(Some("mast_status"), Some("B")).await.unwrap();
    assert!(backend.rows("mast_status").is_empty());
}

#[tokio::test]
async fn delete_is_not_idempotent() {
    let backend = zone_backend(3);
    let svc = service(backend);
    svc.delete(Some("mast_zone"), Some("2")).await.unwrap();
    let err = svc.delete(Some("mast_zone"), Some("2")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn pagination_boundaries() {
    let svc = service(zone_backend(25));
    let page = svc.list(Some("mast_zone"), &ListParams { search: None, limit: 10, offset: 20 }).await.unwrap();
    assert_eq!((page.total, page.data.len(), page.limit, page.offset), (25, 5, 10, 20));

    let page = svc.list(Some("mast_zone"), &ListParams { search: None, limit: 10, offset: 30 }).await.unwrap();
    assert_eq!(page.total, 25);
    assert!(page.data.is_empty());
}

#[tokio::test]
async fn search_finds_inserted_row() {
    let svc = service(zone_backend(5));
    let created = svc.create(Some("mast_zone"), &row(&[("zone_name", text("Kaveri Basin"))])).await.unwrap();
    assert_eq!(created["zone_id"], Value::Int(6));

    let page = svc
        .list(Some("mast_zone"), &ListParams { search: Some("kaveri".into()), limit: 10, offset: 0 })
        .await
        .unwrap();
    assert_eq!(page.data, vec![created]);
    // total reflects the whole table, not the filtered set
    assert_eq!(page.total, 6);
}

#[tokio::test]
async fn numeric_key_update_with_rename_round_trips() {
    let backend = zone_backend(2);
    let svc = service(backend.clone());
    let updated = svc
        .update(Some("mast_zone"), Some("2"), &row(&[("zone_id", Value::Int(20)), ("zone_name", text("Renamed"))]))
        .await
        .unwrap();
    assert_eq!(updated, row(&[("zone_id", Value::Int(20)), ("zone_name", text("Renamed"))]));

    let page = svc.list(Some("mast_zone"), &ListParams { search: Some("renamed".into()), limit: 10, offset: 0 }).await.unwrap();
    assert_eq!(page.data, vec![updated]);
    assert_eq!(svc.update(Some("mast_zone"), Some("2"), &row(&[("zone_name", text("x"))])).await.unwrap_err().http_status(), 404);
}

#[tokio::test]
async fn empty_payload_is_rejected_before_any_statement() {
    let backend = status_backend();
    let svc = service(backend.clone());
    let err = svc.create(Some("mast_status"), &Row::new()).await.unwrap_err();
    assert_eq!(err.message(), "No values provided");
    let err = svc.update(Some("mast_status"), Some("A"), &Row::new()).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn missing_id_is_validation_error() {
    let backend = status_backend();
    let svc = service(backend.clone());
    let err = svc.delete(Some("mast_status"), None).await.unwrap_err();
    assert_eq!(err.message(), ID_REQUIRED_MESSAGE);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unknown_columns_are_rejected_without_insert() {
    let backend = status_backend();
    let svc = service(backend.clone());
    let err = svc
        .create(Some("mast_status"), &row(&[("status_code", text("Z")), ("colour", text("red"))]))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.message(), "Unknown column(s) for mast_status: colour");
    // only the describe ran
    assert_eq!(backend.calls(), 1);
    assert!(backend.rows("mast_status").is_empty());
}

#[tokio::test]
async fn whitelisted_table_missing_from_catalog_is_schema_error() {
    let svc = service(Arc::new(MemoryBackend::new()));
    let err = svc.schema(Some("mast_place")).await.unwrap_err();
    assert!(matches!(err, AppError::Schema { .. }));
    assert_eq!(err.http_status(), 500);
}

#[tokio::test]
async fn database_failures_pass_message_through() {
    let backend = status_backend();
    let svc = service(backend.clone());
    let body = row(&[("status_code", text("A")), ("label", text("Active"))]);
    svc.create(Some("mast_status"), &body).await.unwrap();
    let err = svc.create(Some("mast_status"), &body).await.unwrap_err();
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.message(), "duplicate key value violates unique constraint \"mast_status_pkey\"");
}

#[tokio::test]
async fn negative_limit_surfaces_driver_behaviour() {
    let svc = service(zone_backend(3));
    let err = svc.list(Some("mast_zone"), &ListParams { search: None, limit: -1, offset: 0 }).await.unwrap_err();
    assert_eq!(err.http_status(), 500);
    let page = svc.list(Some("mast_zone"), &ListParams { search: None, limit: 0, offset: 0 }).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total, 3);
}
