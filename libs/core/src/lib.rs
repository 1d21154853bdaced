//! Domain layer for the portfolio analysis orchestration core.
//!
//! Pure domain logic and trait seams only — concrete I/O (the store, the
//! queue, the market oracle, the worker adapters) lives in `infrastructure`.

pub mod contracts;
pub mod domain;
pub mod error;
pub mod events;
pub mod snapshot;
pub mod traits;
