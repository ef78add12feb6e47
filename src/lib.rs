//! relabel — declarative label management for repositories.
//!
//! A rule file compiles into flat label definitions; typed selectors
//! evaluate against a target's facts; a small expression language drives
//! guards and name/description templates; and the reconciliation engine
//! diffs the desired labels against remote state into a minimal, idempotent
//! operation plan.

pub mod cli;
pub mod compile;
pub mod config;
pub mod error;
pub mod expand;
pub mod expr;
pub mod models;
pub mod output;
pub mod provider;
pub mod selectors;
pub mod sync;
