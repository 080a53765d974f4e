//! uptrack-state: embedded endpoint store for uptrack.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the endpoint aggregates
//! (in their persisted document shape) and an append-only log of the
//! health checks applied to them.
//!
//! Every write commits its own transaction before returning, so a read
//! issued after a save always observes it.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
