//! # shipyard-common
//!
//! Shared configuration model, error definitions, constants and domain
//! primitives used across the shipyard workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
