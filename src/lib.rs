//! Minimal Distributed File Store
//!
//! This library crate defines the core modules that make up the file store.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`net`**: The shared transport layer. A line-oriented TCP server with a
//!   bounded worker pool (connections are shed, not queued, when saturated)
//!   plus the request/response client helper used for inter-node calls.
//! - **`locking`**: The lock arbiter. A single-threaded request-reply service
//!   granting named mutual-exclusion locks across the cluster, and the polling
//!   client that acquires them.
//! - **`directory`**: The placement layer. Maps a logical directory to its
//!   primary storage node, backed by a relational store, and hands out the
//!   replica set used for fan-out.
//! - **`fileserver`**: The per-node storage service. Handles upload, download
//!   and update over the wire protocol and pushes writes to replica nodes.
//! - **`replicator`**: The background rebalancer. Asks the file catalog what
//!   to fetch next and makes room for it by evicting lower-priority files.

pub mod directory;
pub mod fileserver;
pub mod locking;
pub mod net;
pub mod replicator;
