//! Integration test crate for the Tox-like messaging runtime.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end flows across multiple workspace crates,
//! mirroring the six scenarios the wire and retry contracts are
//! specified against.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tox-integration-tests
//! ```
