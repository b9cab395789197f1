//! Shared Transport Layer
//!
//! Implements the line-oriented TCP transport the directory and file services
//! are built on.
//!
//! ## Core Concepts
//! - **Framing**: A message is text terminated by a blank line (`\n\n`);
//!   partial reads are accumulated until the terminator (or EOF) is seen.
//! - **Bounded pool**: Accepted connections are fed through a bounded queue to
//!   a fixed set of worker tasks. When the queue is full the connection is
//!   closed immediately instead of blocking the accept loop.
//! - **Built-ins**: `KILL_SERVICE` and `HELO` are answered by the transport
//!   itself; anything the service handler does not recognize gets
//!   `ERROR: INVALID MESSAGE`.

pub mod client;
pub mod server;

#[cfg(test)]
mod tests;
