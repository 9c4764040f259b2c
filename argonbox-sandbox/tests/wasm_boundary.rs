//! Integration tests for the boundary with a compiled module
//!
//! These run against a small stand-in module (`fixtures/mock_argon2.wat`)
//! whose control values trigger failures, traps and bad message addresses.

mod common;

use rstest::rstest;

use argonbox_core::{HashError, HashRequest};
use argonbox_sandbox::HashExecutionError;

use common::{
    MOCK_MODULE, counting_mock_hasher, failing_free_mock_hasher, imported_memory_module,
};

/// Bytes the stand-in module produces for Argon2i
fn mock_hash(password: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| password[i % password.len()] ^ salt[i % salt.len()] ^ (i as u8).wrapping_add(1))
        .collect()
}

fn request(time_cost: u32) -> HashRequest {
    HashRequest::new("password", "somesalt")
        .with_time_cost(time_cost)
        .with_hash_length(16)
}

fn hash_error(err: HashExecutionError) -> HashError {
    match err {
        HashExecutionError::Hash(err) => err,
        other => panic!("unexpected error: {other}"),
    }
}

/// Test that outputs are read back from module memory
#[tokio::test]
async fn test_successful_call_reads_outputs() {
    let (hasher, counter) = counting_mock_hasher(MOCK_MODULE);

    let result = hasher.hash(&request(2)).await.unwrap();

    assert_eq!(result.hash, mock_hash(b"password", b"somesalt", 16));
    assert_eq!(result.hash_hex, hex::encode(&result.hash));
    assert_eq!(result.encoded, "$mock$v=19$ok");
    assert_eq!(counter.allocated(), 4);
    assert_eq!(counter.outstanding(), 0);
}

/// Test that a non-zero status is resolved through the module's message table
#[rstest]
#[case(1035, -35, "Simulated failure")]
#[case(1012, -12, "Unknown error code")]
#[case(1099, -99, "")]
#[case(1098, -98, "")]
#[tokio::test]
async fn test_status_translation(
    #[case] time_cost: u32,
    #[case] code: i32,
    #[case] message: &str,
) {
    let (hasher, counter) = counting_mock_hasher(MOCK_MODULE);

    let err = hash_error(hasher.hash(&request(time_cost)).await.unwrap_err());

    assert_eq!(err.code, code);
    assert_eq!(err.message, message);
    assert_eq!(counter.outstanding(), 0);
}

/// Test that a trap is reported without a native status
#[tokio::test]
async fn test_trap_has_no_status() {
    let (hasher, counter) = counting_mock_hasher(MOCK_MODULE);

    let err = hash_error(hasher.hash(&request(666)).await.unwrap_err());

    assert_eq!(err.code, HashError::NO_STATUS);
    assert!(!err.has_native_status());
    assert!(!err.message.is_empty());
    assert_eq!(counter.allocated(), 4);
    assert_eq!(counter.outstanding(), 0);
}

/// Test that a failed allocation aborts before the native call
#[tokio::test]
async fn test_allocation_failure() {
    let (hasher, counter) = counting_mock_hasher(MOCK_MODULE);
    let request = request(2).with_hash_length(32 * 1024 * 1024);

    let err = hasher.hash(&request).await.unwrap_err();

    assert!(matches!(err, HashExecutionError::Allocation(_)));
    assert_eq!(counter.allocated(), 2);
    assert_eq!(counter.outstanding(), 0);
}

/// Test that repeated failing calls do not grow outstanding allocations
#[tokio::test]
async fn test_no_leak_across_failures() {
    let (hasher, counter) = counting_mock_hasher(MOCK_MODULE);

    for time_cost in [1035, 666, 1099, 1035, 666] {
        assert!(hasher.hash(&request(time_cost)).await.is_err());
        assert_eq!(counter.outstanding(), 0);
    }
    assert_eq!(counter.allocated(), 20);
}

/// Test that a failed free neither blocks the other frees nor the result
#[rstest]
#[case(0)]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn test_failed_free_does_not_mask_success(#[case] index: usize) {
    let (hasher, counter) = failing_free_mock_hasher(index);

    let (result, stats) = hasher.hash_with_stats(&request(2)).await.unwrap();

    assert_eq!(result.hash, mock_hash(b"password", b"somesalt", 16));
    assert_eq!(stats.failed_frees, 1);
    assert_eq!(counter.free_attempts(), 4);
    assert_eq!(counter.freed(), 3);
}

/// Test that a failed free leaves the native status intact
#[tokio::test]
async fn test_failed_free_does_not_mask_status() {
    let (hasher, counter) = failing_free_mock_hasher(2);

    let err = hash_error(hasher.hash(&request(1035)).await.unwrap_err());

    assert_eq!(err.code, -35);
    assert_eq!(err.message, "Simulated failure");
    assert_eq!(counter.free_attempts(), 4);
    assert_eq!(counter.freed(), 3);
}

/// Test that a failed free leaves a trap report intact
#[tokio::test]
async fn test_failed_free_does_not_mask_trap() {
    let (hasher, counter) = failing_free_mock_hasher(0);

    let err = hash_error(hasher.hash(&request(666)).await.unwrap_err());

    assert_eq!(err.code, HashError::NO_STATUS);
    assert_eq!(counter.free_attempts(), 4);
    assert_eq!(counter.freed(), 3);
}

/// Test that an imported memory is created with the computed size
#[tokio::test]
async fn test_imported_memory_is_sized_from_cost() {
    let (hasher, _) = counting_mock_hasher(&imported_memory_module());

    let (result, stats) = hasher.hash_with_stats(&request(2)).await.unwrap();

    assert_eq!(result.encoded, "$mock$v=19$ok");
    assert_eq!(stats.memory_pages, 512);
    assert_eq!(stats.failed_frees, 0);
}

/// Test that a module that cannot be compiled fails instantiation, not hashing
#[tokio::test]
async fn test_malformed_module() {
    let (hasher, counter) = counting_mock_hasher("(module (func (export \"malloc\"");

    let err = hasher.hash(&request(2)).await.unwrap_err();

    assert!(matches!(err, HashExecutionError::Instantiation(_)));
    assert_eq!(counter.allocated(), 0);
}

/// Test that concurrent calls each get their own instance
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_are_isolated() {
    let (hasher, counter) = counting_mock_hasher(MOCK_MODULE);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let hasher = hasher.clone();
            let request = HashRequest::new(&format!("pw{i}"), "somesalt").with_hash_length(8);
            tokio::spawn(async move { (i, hasher.hash(&request).await) })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        let password = format!("pw{i}");
        assert_eq!(
            result.unwrap().hash,
            mock_hash(password.as_bytes(), b"somesalt", 8)
        );
    }
    assert_eq!(counter.outstanding(), 0);
}
