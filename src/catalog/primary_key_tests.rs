use super::*;
use crate::backend::MemoryBackend;
use crate::registry::TableRegistry;

#[test]
fn classification_follows_type_and_sequence() {
    assert_eq!(classify("int2", None), StorageClass::Numeric);
    assert_eq!(classify("int4", None), StorageClass::Numeric);
    assert_eq!(classify("int8", None), StorageClass::Numeric);
    assert_eq!(classify("numeric", Some("nextval('t_id_seq'::regclass)")), StorageClass::Numeric);
    assert_eq!(classify("text", None), StorageClass::Textual);
    assert_eq!(classify("varchar", Some("'x'::character varying")), StorageClass::Textual);
    assert_eq!(classify("uuid", None), StorageClass::Textual);
}

#[test]
fn fallback_prefers_sequence_then_code_then_first() {
    let seq = vec![
        ColumnDescriptor::text("region_code"),
        ColumnDescriptor::serial("row_no", "mast_region"),
    ];
    assert_eq!(choose_fallback(&seq).unwrap().name, "row_no");

    let code = vec![
        ColumnDescriptor::text("label"),
        ColumnDescriptor::integer("country_id"),
        ColumnDescriptor::text("Region_CODE"),
    ];
    assert_eq!(choose_fallback(&code).unwrap().name, "Region_CODE");

    let first = vec![ColumnDescriptor::text("label"), ColumnDescriptor::integer("country_id")];
    assert_eq!(choose_fallback(&first).unwrap().name, "label");

    assert!(choose_fallback(&[]).is_none());
}

#[test]
fn identity_column_wins_over_code_column() {
    let cols = vec![
        ColumnDescriptor::text("region_code"),
        ColumnDescriptor::identity("region_id"),
    ];
    let chosen = choose_fallback(&cols).unwrap();
    assert_eq!(chosen.name, "region_id");
    assert_eq!(PrimaryKeyDescriptor::from_column(chosen).storage_class, StorageClass::Numeric);
}

#[test]
fn substring_id_columns_are_not_keys() {
    // a column merely containing "id" must not win over a *_code natural key
    let cols = vec![ColumnDescriptor::integer("country_id"), ColumnDescriptor::text("region_code")];
    assert_eq!(choose_fallback(&cols).unwrap().name, "region_code");
}

#[test]
fn numeric_id_coercion() {
    let pk = PrimaryKeyDescriptor::from_column(&ColumnDescriptor::bigint("id"));
    assert_eq!(pk.storage_class, StorageClass::Numeric);
    assert_eq!(pk.coerce_id("15").unwrap(), Value::Int(15));
    assert!(pk.coerce_id("1.5").is_err());

    let pk = PrimaryKeyDescriptor::from_column(&ColumnDescriptor::text("code"));
    assert_eq!(pk.coerce_id(" 15").unwrap(), Value::Text(" 15".into()));
}

fn registry() -> TableRegistry {
    TableRegistry::from_names(["t_catalog", "t_serial", "t_code", "t_plain", "t_missing"])
}

#[tokio::test]
async fn catalog_key_wins() {
    let backend = MemoryBackend::new().with_table(
        "t_catalog",
        vec![
            ColumnDescriptor::serial("row_no", "t_catalog"),
            ColumnDescriptor::text("lang_code").primary_key(),
        ],
    );
    let reg = registry();
    let pk = PrimaryKeyResolver::new(&backend).resolve(reg.validate(Some("t_catalog")).unwrap()).await.unwrap();
    assert_eq!(pk.column_name, "lang_code");
    assert_eq!(pk.storage_class, StorageClass::Textual);
    assert_eq!(pk.sql_type, SqlType::builtin("text"));
    // one catalog query, no describe needed
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn heuristics_apply_without_catalog_key() {
    let backend = MemoryBackend::new()
        .with_table("t_serial", vec![ColumnDescriptor::text("label"), ColumnDescriptor::serial("sid", "t_serial")])
        .with_table("t_code", vec![ColumnDescriptor::integer("country_id"), ColumnDescriptor::text("xyz_code")])
        .with_table("t_plain", vec![ColumnDescriptor::text("name"), ColumnDescriptor::text("note")]);
    let reg = registry();
    let resolver = PrimaryKeyResolver::new(&backend);

    let pk = resolver.resolve(reg.validate(Some("t_serial")).unwrap()).await.unwrap();
    assert_eq!((pk.column_name.as_str(), pk.storage_class), ("sid", StorageClass::Numeric));

    let pk = resolver.resolve(reg.validate(Some("t_code")).unwrap()).await.unwrap();
    assert_eq!((pk.column_name.as_str(), pk.storage_class), ("xyz_code", StorageClass::Textual));

    let pk = resolver.resolve(reg.validate(Some("t_plain")).unwrap()).await.unwrap();
    assert_eq!(pk.column_name, "name");
}

#[tokio::test]
async fn known_columns_skip_second_describe() {
    let cols = vec![ColumnDescriptor::text("name")];
    let backend = MemoryBackend::new().with_table("t_plain", cols.clone());
    let reg = registry();
    let pk = PrimaryKeyResolver::new(&backend)
        .resolve_with_columns(reg.validate(Some("t_plain")).unwrap(), Some(&cols))
        .await
        .unwrap();
    assert_eq!(pk.column_name, "name");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn table_unknown_to_catalog_is_schema_error() {
    let backend = MemoryBackend::new();
    let reg = registry();
    let err = PrimaryKeyResolver::new(&backend).resolve(reg.validate(Some("t_missing")).unwrap()).await.unwrap_err();
    assert!(matches!(err, AppError::Schema { .. }));
    assert_eq!(err.http_status(), 500);
}
