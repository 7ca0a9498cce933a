//! Common test utilities for altdot-extensions
//!
//! Shared infrastructure for the lifecycle integration tests:
//! - A harness wiring a temp extension root, an in-memory database and a
//!   mock registry into a loader
//! - Manifest and zip bundle builders
//! - Recording mocks for the registry and host hooks

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
