//! Integration tests for the configured service

use std::fs;
use std::path::PathBuf;

use rstest::rstest;
use tempfile::TempDir;

use argonbox::{Argon2Service, Argon2Variant, Config, HashRequest, ServiceError};

fn mock_module_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("argonbox-sandbox/tests/fixtures/mock_argon2.wat")
}

/// Write `default.toml` into a fresh directory and load it
fn load_config(toml: &str) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("default.toml"), toml).unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    (dir, config)
}

/// Test that configured hashing defaults reach the primitive
#[tokio::test]
async fn test_configured_defaults_are_used() {
    let (_dir, config) = load_config(
        r#"
        [hashing]
        time_cost = 1
        memory_cost_kib = 32
        hash_length = 20
        variant = "argon2id"

        [sandbox]
        backend = "native"
        "#,
    );
    let service = Argon2Service::from_config(&config).unwrap();

    let result = service.hash_text("password", "somesalt").await.unwrap();

    assert_eq!(result.hash.len(), 20);
    assert!(result.encoded.starts_with("$argon2id$v=19$m=32,t=1,p=1$"));
}

/// Test that request fields override configured defaults
#[tokio::test]
async fn test_request_overrides_defaults() {
    let service = Argon2Service::from_config(&Config::default()).unwrap();
    let request = HashRequest::new("password", "somesalt")
        .with_time_cost(1)
        .with_memory_cost_kib(16)
        .with_hash_length(16)
        .with_variant(Argon2Variant::Argon2d);

    let result = service.hash(&request).await.unwrap();

    assert_eq!(result.hash_hex.len(), 32);
    assert!(result.encoded.starts_with("$argon2d$v=19$m=16,t=1,p=1$"));
}

/// Test hashing then verifying through the façade
#[tokio::test]
async fn test_hash_then_verify() {
    let service = Argon2Service::from_config(&Config::default()).unwrap();
    let request = HashRequest::new("correct horse", "battery staple")
        .with_time_cost(1)
        .with_memory_cost_kib(64);
    let result = service.hash(&request).await.unwrap();

    assert!(service.verify("correct horse", &result.encoded, None).await.unwrap());
    assert!(!service.verify("wrong horse", &result.encoded, None).await.unwrap());
}

/// Test that a module image on disk selects the wasm backend
#[tokio::test]
async fn test_image_path_runs_module() {
    let mut config = Config::default();
    config.sandbox.image_path = Some(mock_module_path());
    let service = Argon2Service::from_config(&config).unwrap();
    assert_eq!(service.backend_name(), "wasm");

    let request = HashRequest::new("password", "somesalt")
        .with_time_cost(1035)
        .with_hash_length(8);
    let err = service.hash(&request).await.unwrap_err();

    match err {
        ServiceError::Hash(err) => {
            let hash_error = err.hash_error().unwrap();
            assert_eq!(hash_error.code, -35);
            assert_eq!(hash_error.message, "Simulated failure");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test that a missing image file is an instantiation failure
#[tokio::test]
async fn test_missing_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.sandbox.backend = "wasm".to_string();
    config.sandbox.image_path = Some(dir.path().join("absent.wasm"));
    let service = Argon2Service::from_config(&config).unwrap();

    let err = service.hash_text("password", "somesalt").await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Hash(argonbox::argonbox_sandbox::HashExecutionError::Instantiation(_))
    ));
}

/// Test backend names accepted by configuration
#[rstest]
#[case("auto", "native")]
#[case("native", "native")]
#[case("NATIVE", "native")]
fn test_backend_selection(#[case] configured: &str, #[case] expected: &str) {
    let mut config = Config::default();
    config.sandbox.backend = configured.to_string();
    let service = Argon2Service::from_config(&config).unwrap();
    assert_eq!(service.backend_name(), expected);
}

/// Test that an unknown backend is rejected before any work
#[test]
fn test_unknown_backend_rejected() {
    let mut config = Config::default();
    config.sandbox.backend = "landlock".to_string();
    assert!(matches!(
        Argon2Service::from_config(&config),
        Err(ServiceError::Config(_))
    ));
}
