//! # bock-common
//!
//! Shared types for the Bock health tooling.
//!
//! This crate provides:
//! - The common error type and result alias
//! - Validated container identifiers

#![warn(missing_docs)]

pub mod error;
pub mod id;

pub use error::{BockError, BockResult};
pub use id::ContainerId;
