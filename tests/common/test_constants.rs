//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Default machine type used by genlaunch when no override is provided.
pub const DEFAULT_INSTANCE_TYPE: &str = "vcpu-4_memory-12g_disk-80g_nvidia1080ti-1";

/// Image name used by the round-trip fixtures and its identifier.
pub const IMAGE: (&str, &str) = ("Ubuntu 18.04", "img-1");

/// SSH key name used by the round-trip fixtures and its identifier.
pub const SSH_KEY: (&str, &str) = ("mykey", "key-1");

/// Security group name used by the round-trip fixtures and its identifier.
pub const SECURITY_GROUP: (&str, &str) = ("standard", "sg-1");
