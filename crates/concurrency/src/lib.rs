//! Concurrency layer for widemap
//!
//! This crate implements partition-scoped transactions over the store's
//! explicit local transactions:
//! - Transaction: status state machine with lazy timeout detection
//! - Client-side partition-key enforcement before any request is sent
//! - TransactionCoordinator: transaction start and lifecycle metrics
//!
//! Range scans and multi-partition batches are not available inside a
//! transaction.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod transaction;

pub use coordinator::{TransactionCoordinator, TransactionCounters, TransactionMetrics};
pub use transaction::{Transaction, TransactionStatus, TransactionWrite};
