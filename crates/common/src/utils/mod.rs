//! Common utility helpers
//!
//! - **[`serde`]**: serialization helpers for `Duration` fields

pub mod serde;

pub use self::serde::{duration_millis, duration_secs};
