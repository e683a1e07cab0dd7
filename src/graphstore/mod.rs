//! Concrete `GraphStore` implementation(s). Only one backend ships today
//! (SQLite), matching the teacher's single-backend `SqliteStore`, but the
//! trait boundary in `providers::graph_store` is what the rest of the crate
//! depends on.

mod sqlite;
mod vec_index;

pub use sqlite::SqliteGraphStore;
