//! Shared utilities.

pub mod id;
