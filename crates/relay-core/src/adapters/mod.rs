//! Storage adapters for the record store traits.
//!
//! Only the in-memory implementations live here; a database-backed adapter
//! would implement the same traits in its own crate.

mod memory;

pub use memory::{InMemoryMessageStore, InMemoryWebhookStore};
