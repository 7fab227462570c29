//! diffwatch - regional change notifications from the OpenStreetMap
//! minutely replication feed.
//!
//! See [`pipeline`] for the processing flow and `src/bin/diffwatch.rs` for
//! the runtime that wires it to real endpoints.

pub mod config;
pub mod error;
pub mod http;
pub mod persistence;
pub mod pipeline;
pub mod region;
pub mod retry;

pub use error::{DecodeError, FeedError, FeedResult};
