//! Integration test crate for the ANALOGIC workspace.
//!
//! All tests live under `tests/`; this library is intentionally empty.
