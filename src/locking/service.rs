use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::protocol::{LockRequest, LockResponse};

/// The lock arbiter.
///
/// Holds the lock table in memory only; nothing survives a restart. One
/// request is fully answered before the next connection is accepted, so the
/// table needs no locking of its own.
pub struct LockService {
    listener: TcpListener,
    local_addr: SocketAddr,
    locks: HashMap<String, String>,
}

impl LockService {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            locks: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until `DONE` arrives, then drops the listener so any
    /// later connection attempt is refused.
    pub async fn serve(mut self) -> Result<()> {
        tracing::info!("Lock service listening on {}", self.local_addr);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            match self.serve_connection(stream).await {
                Ok(done) => {
                    if done {
                        tracing::info!("Closing lock service");
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!("Connection from {} failed: {}", peer, e);
                }
            }
        }
    }

    /// Reads one request line, answers it, closes. Returns true on `DONE`.
    async fn serve_connection(&mut self, stream: TcpStream) -> Result<bool> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line.is_empty() {
            return Ok(false);
        }

        let (response, done) = self.respond(&line);
        let mut stream = reader.into_inner();
        stream
            .write_all(format!("{}\n", response.encode()).as_bytes())
            .await?;
        stream.shutdown().await?;

        Ok(done)
    }

    fn respond(&mut self, line: &str) -> (LockResponse, bool) {
        match LockRequest::decode(line) {
            Ok(LockRequest::Ping) => (LockResponse::Pong, false),
            Ok(LockRequest::Lock { name, id }) => (self.lock(name, id), false),
            Ok(LockRequest::Unlock { name, id }) => (self.unlock(&name, &id), false),
            Ok(LockRequest::Done) => (
                LockResponse::Close("Closing lock service".to_string()),
                true,
            ),
            Err(msg) => {
                tracing::error!("MSG_ERROR: {}", msg);
                (LockResponse::MsgError(msg), false)
            }
        }
    }

    /// Grants the lock by inserting into the table, or tells the caller to
    /// wait if any holder (including itself) is already recorded.
    fn lock(&mut self, name: String, id: String) -> LockResponse {
        if self.locks.contains_key(&name) {
            LockResponse::Wait
        } else {
            self.locks.insert(name, id);
            LockResponse::Go
        }
    }

    /// Removes the lock only when the recorded holder matches; releasing
    /// fails closed otherwise and the table is left untouched.
    fn unlock(&mut self, name: &str, id: &str) -> LockResponse {
        match self.locks.get(name) {
            None => {
                let msg = format!("Lock `{}` is not held", name);
                tracing::error!("RELEASE_ERROR: {}", msg);
                LockResponse::ReleaseError(msg)
            }
            Some(holder) if holder != id => {
                let msg = format!(
                    "Lock was acquired by `{}` and not by `{}`",
                    holder, id
                );
                tracing::error!("RELEASE_ERROR: {}", msg);
                LockResponse::ReleaseError(msg)
            }
            Some(_) => {
                self.locks.remove(name);
                LockResponse::Unlocked
            }
        }
    }
}
