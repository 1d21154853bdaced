//! Concrete implementations of the `planner_core` traits: SQLite-backed
//! store and queue, an HTTP market oracle, and the LLM-backed worker
//! adapters.

pub mod db;
pub mod market_oracle;
pub mod queue;
pub mod store;
pub mod workers;
