//! Distributed Lock Module
//!
//! Implements named mutual exclusion across the cluster with a single
//! arbiter process.
//!
//! ## Architecture Overview
//! The arbiter answers one request at a time over a strictly ordered
//! request-reply transport: a connection is accepted, one request is read and
//! fully answered, and only then is the next connection accepted. Because the
//! transport serializes every access, the lock table is a plain map with no
//! interior locking.
//!
//! There is no queueing on the server: a client that gets `WAIT` polls again
//! after a fixed interval until it wins the lock. Under contention the first
//! client to poll after a release wins; no fairness is guaranteed.
//!
//! ## Submodules
//! - **`protocol`**: Tagged request/response messages and their exact wire
//!   encoding (`:`-delimited, one line per message).
//! - **`service`**: The arbiter process and its lock table.
//! - **`client`**: The blocking acquire/release wrapper with the retry loop.

pub mod client;
pub mod protocol;
pub mod service;
