//! Storage layer for widemap
//!
//! This crate provides the in-process store behind the `StoreClient`
//! boundary:
//! - MemoryStore: ordered tables with RwLock, range scans and local
//!   single-partition transactions
//! - filter: server-side evaluation of `StoreFilter` trees
//!
//! Production deployments supply their own `StoreClient` over the real
//! wide-column store; MemoryStore is what tests, benchmarks and embedded
//! users run against.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod memory;

pub use memory::MemoryStore;
