use repram_common::RepramError;

#[test]
fn test_error_display() {
    let err = RepramError::KeyNotFound("test_key".to_string());
    assert_eq!(err.to_string(), "Key not found: test_key");
}

#[test]
fn test_error_equality() {
    let err1 = RepramError::KeyNotFound("key1".to_string());
    let err2 = RepramError::KeyNotFound("key1".to_string());
    let err3 = RepramError::KeyNotFound("key2".to_string());

    assert_eq!(err1, err2);
    assert_ne!(err1, err3);
}

#[test]
fn test_network_error() {
    let err = RepramError::NetworkError("connection failed".to_string());
    assert_eq!(err.to_string(), "Network error: connection failed");
}

#[test]
fn test_http_error_5xx() {
    let err = RepramError::HttpError(507, "Storage is full".to_string());
    assert_eq!(err.to_string(), "HTTP 507: Storage is full");
}

#[test]
fn test_key_too_large() {
    let err = RepramError::KeyTooLarge(1024);
    assert_eq!(err.to_string(), "Key exceeds maximum size of 1024 bytes");
}

#[test]
fn test_value_too_large() {
    let err = RepramError::ValueTooLarge(4194304);
    assert_eq!(err.to_string(), "Value exceeds maximum size of 4194304 bytes");
}

#[test]
fn test_http_error() {
    let err = RepramError::HttpError(400, "Key exceeds maximum size of 1024 bytes".to_string());
    assert_eq!(err.to_string(), "HTTP 400: Key exceeds maximum size of 1024 bytes");
}

#[test]
fn test_missing_header() {
    let err = RepramError::MissingHeader("X-TTL".to_string());
    assert_eq!(err.to_string(), "Request is missing a required header: X-TTL");
}

#[test]
fn test_storage_full_display() {
    assert_eq!(RepramError::StorageFull.to_string(), "Storage is full");
}

#[test]
fn test_auth_reject_display() {
    assert_eq!(
        RepramError::AuthReject.to_string(),
        "Gossip or bootstrap message failed authentication"
    );
}
