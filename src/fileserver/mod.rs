//! File Server Module
//!
//! The per-node storage service. Files live in a bucket directory keyed by
//! the node's port; payloads cross the wire base64-encoded so the protocol
//! stays line oriented.
//!
//! ## Replica fan-out
//! An `UPLOAD` is written locally, acknowledged, and then pushed as an
//! `UPDATE` to every slave the directory service returns for this node.
//! `UPDATE` writes locally only; propagation terminates after one hop, which
//! is what keeps replication from looping. Fan-out is best effort per slave:
//! one failed push never aborts the others, and the uploader's `OK` does not
//! depend on any of them.
//!
//! ## Submodules
//! - **`protocol`**: `UPLOAD`/`UPDATE`/`DOWNLOAD` wire messages.
//! - **`service`**: The storage handler, the resident-file index and the
//!   fan-out path.

pub mod protocol;
pub mod service;
