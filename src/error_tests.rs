use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::validation("invalid_table", "oops").http_status(), 400);
    assert_eq!(AppError::not_found("row_not_found", "missing").http_status(), 404);
    assert_eq!(AppError::schema("unknown_table", "no columns").http_status(), 500);
    assert_eq!(AppError::database("23505", "dup").http_status(), 500);
}

#[test]
fn client_error_classification() {
    assert!(AppError::validation("c", "m").is_client_error());
    assert!(AppError::not_found("c", "m").is_client_error());
    assert!(!AppError::schema("c", "m").is_client_error());
    assert!(!AppError::database("c", "m").is_client_error());
}

#[test]
fn display_includes_code_and_message() {
    let e = AppError::validation("empty_payload", "No values provided");
    assert_eq!(e.code_str(), "empty_payload");
    assert_eq!(e.message(), "No values provided");
    assert_eq!(e.to_string(), "empty_payload: No values provided");
}

#[test]
fn json_errors_are_database_errors() {
    let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let e = AppError::from(bad);
    assert_eq!(e.code_str(), "decode_error");
    assert_eq!(e.http_status(), 500);
}
