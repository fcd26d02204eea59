//! Query cache: key-addressed, in-memory, never persisted.

pub mod key;
pub mod store;

pub use key::{Entity, KeyPattern, ListInput, Operation, QueryKey};
pub use store::{CacheTxn, FetchTicket, QueryCache, QueryData};
