use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::protocol::{LockRequest, LockResponse, DEFAULT_LOCK, DELIMITER};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Request-reply client for the lock arbiter.
///
/// Carries no open socket: every request opens its own connection, so the
/// client can be cloned or moved between tasks freely and the channel is
/// re-established on first use after any transfer.
#[derive(Debug, Clone)]
pub struct LockClient {
    addr: SocketAddr,
    lock_name: String,
    poll_interval: Duration,
    /// Stable requester identity, derived once on `connect`.
    id: Option<String>,
}

impl LockClient {
    pub fn new(addr: SocketAddr, lock_name: &str) -> Self {
        Self {
            addr,
            lock_name: lock_name.to_string(),
            poll_interval: POLL_INTERVAL,
            id: None,
        }
    }

    pub fn with_default_lock(addr: SocketAddr) -> Self {
        Self::new(addr, DEFAULT_LOCK)
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// The identity the arbiter knows this client by, once connected.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Verifies the arbiter is reachable with a ping-pong round trip and
    /// derives the stable client identity from host name and process id.
    pub async fn connect(&mut self) -> Result<()> {
        match self.request(&LockRequest::Ping).await? {
            LockResponse::Pong => {}
            other => {
                return Err(anyhow::anyhow!(
                    "Connection test to lock service failed: {:?}",
                    other
                ));
            }
        }
        self.id = Some(client_identity());
        Ok(())
    }

    /// Acquires the lock, blocking the caller until it is granted.
    ///
    /// Polls with a fixed sleep between `WAIT` responses. Any response other
    /// than `GO`/`WAIT` indicates a protocol bug and is fatal to the call.
    pub async fn acquire(&mut self) -> Result<()> {
        let id = self.ensure_connected().await?;
        let request = LockRequest::Lock {
            name: self.lock_name.clone(),
            id,
        };

        loop {
            match self.request(&request).await? {
                LockResponse::Go => return Ok(()),
                LockResponse::Wait => tokio::time::sleep(self.poll_interval).await,
                other => {
                    return Err(anyhow::anyhow!(
                        "Response `{}` not understood",
                        other.encode()
                    ));
                }
            }
        }
    }

    /// Releases the lock. A refusal means the caller does not hold it (or
    /// held it under a stale identity) and is surfaced as an error.
    pub async fn release(&mut self) -> Result<()> {
        let id = self.ensure_connected().await?;
        let request = LockRequest::Unlock {
            name: self.lock_name.clone(),
            id: id.clone(),
        };

        match self.request(&request).await? {
            LockResponse::Unlocked => Ok(()),
            other => Err(anyhow::anyhow!(
                "Could not release lock `{}` (`{}`) because of `{}`",
                self.lock_name,
                id,
                other.encode()
            )),
        }
    }

    /// Tells the arbiter to shut down once all workers are finished.
    pub async fn send_done(&mut self) -> Result<()> {
        match self.request(&LockRequest::Done).await? {
            LockResponse::Close(_) => Ok(()),
            other => Err(anyhow::anyhow!(
                "Unexpected response to DONE: `{}`",
                other.encode()
            )),
        }
    }

    async fn ensure_connected(&mut self) -> Result<String> {
        if self.id.is_none() {
            self.connect().await?;
        }
        Ok(self.id.clone().unwrap_or_default())
    }

    async fn request(&self, request: &LockRequest) -> Result<LockResponse> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream
            .write_all(format!("{}\n", request.encode()).as_bytes())
            .await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        LockResponse::decode(&line)
            .ok_or_else(|| anyhow::anyhow!("Undecodable lock response: {:?}", line))
    }
}

/// `<host>__<pid>`, with the reserved delimiter stripped from the host part.
fn client_identity() -> String {
    format!(
        "{}__{}",
        hostname().replace(DELIMITER, "-"),
        std::process::id()
    )
}

/// System hostname, or "unknown" if it can't be determined.
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".into())
}
