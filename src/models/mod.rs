//! Data models: label definitions and target fact snapshots.

pub mod label;
pub mod target;
