//! Vigil Core
//!
//! Shared types used across the checker: source locations, constant
//! values, annotation qualifiers, the C type model, storage references
//! and their state lattices, diagnostics, and configuration.

pub mod config;
pub mod diag;
pub mod loc;
pub mod qual;
pub mod store;
pub mod types;
pub mod values;
