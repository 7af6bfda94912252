//! Shared types for the mezzo metadata aggregation service
//!
//! Holds the pieces every mezzo crate needs: the common error type,
//! configuration loading, entity hashing and the event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod hashing;

pub use error::{Error, Result};
