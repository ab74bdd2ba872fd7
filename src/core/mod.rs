//! Core pipeline logic: schema, selection, planning, execution, state.

pub mod catalog;
pub mod changeset;
pub mod error;
pub mod executor;
pub mod notify;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod selector;
pub mod state;
pub mod types;
