//! Python bindings (feature `pyo3`)
//!
//! Exposes the deterministic draw service and the config fingerprint so job
//! code written outside Rust draws exactly the same values as the Rust jobs.

pub mod rng;
