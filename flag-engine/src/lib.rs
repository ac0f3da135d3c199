pub mod api;
pub mod config;
pub mod experiments;
pub mod flags;
pub mod store;

// Test helpers are compiled into the library so integration tests under
// tests/ can reuse them. If this ever bloats the binary, move them behind a
// "test-utils" cargo feature.
pub mod test_utils;
