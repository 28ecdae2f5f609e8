//! Shared test helpers for `farmgate-core` integration tests.
//!
//! Provides a scripted remote dependency so batch tests can focus on
//! behaviour instead of boilerplate.

pub mod remote;
