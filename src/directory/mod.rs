//! Directory Service Module
//!
//! The placement layer: maps a logical parent directory to the storage node
//! that is primary for it, and hands out the remaining registered nodes as
//! replica targets.
//!
//! ## Core Concepts
//! - **Lazy binding**: A path's parent directory is bound to a pseudo-randomly
//!   chosen registered server on first lookup, then the mapping is stable.
//! - **Content addressing**: Stored filenames are the SHA-256 of the full
//!   logical path plus the original extension, so two paths with the same
//!   base name never collide on disk.
//! - **Persistence**: All state lives in a relational store; every operation
//!   is one short-lived statement, no caching layer in front.
//!
//! ## Submodules
//! - **`store`**: The sqlite-backed `Servers`/`Directories` tables.
//! - **`protocol`**: `GET_SERVER`/`GET_SLAVES` wire messages.
//! - **`service`**: The wire-protocol handler on the shared transport.
//! - **`handlers`**: The administrative HTTP API for registering nodes.

pub mod handlers;
pub mod protocol;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;
