//! # Farmgate Domain
//!
//! Configuration value objects and the domain error type.
//!
//! ## Architecture
//! - No dependencies on other Farmgate crates
//! - Only external dependencies allowed
//! - Plain data: validation lives here, wiring lives in `farmgate-infra`

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
