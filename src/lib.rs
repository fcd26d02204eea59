//! todo-sync: optimistic client cache with cross-surface sync.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod mutations;
pub mod notify;
pub mod query;
pub mod remote;
pub mod surface;
pub mod sync;
pub mod todos;
