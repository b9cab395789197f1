//! Replicator Module
//!
//! The background rebalancer that keeps replica counts up under a disk-space
//! budget.
//!
//! ## Architecture Overview
//! Each cycle asks the file catalog which file this node should hold next,
//! makes room for it by greedily evicting the lowest-priority resident files
//! (never one as important as the incoming file), then downloads it from a
//! donor node. The policy is locally optimal and stateless: no global
//! coordinator decides evictions.
//!
//! Priorities are `kn` ranks: lower means more important. A resident file may
//! only be evicted while its rank is at least `incoming + 1`.
//!
//! ## Submodules
//! - **`catalog`**: The `FileCatalog` capability interface and the in-memory
//!   backend.
//! - **`service`**: The idle/active loop and the per-cycle algorithm.

pub mod catalog;
pub mod service;
