use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// Every message on the wire ends with a blank line.
pub const MESSAGE_TERMINATOR: &str = "\n\n";
/// Response for messages no handler recognizes.
pub const INVALID_RESPONSE: &str = "ERROR: INVALID MESSAGE\n\n";
/// Orderly-kill message; answered with silence and shutdown.
pub const KILL_MESSAGE: &str = "KILL_SERVICE\n";

const READ_BUFFER: usize = 4096;

/// Type alias for a thread-safe, asynchronous message handler.
/// It takes the raw message and the peer address and returns the response to
/// send, or `None` when the message is not recognized.
pub type MessageHandlerFn = Arc<
    dyn Fn(String, SocketAddr) -> Pin<Box<dyn Future<Output = Option<String>> + Send>>
        + Send
        + Sync,
>;

/// Wraps a plain async closure into a type-erased [`MessageHandlerFn`].
pub fn handler_fn<F, Fut>(handler: F) -> MessageHandlerFn
where
    F: Fn(String, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    Arc::new(move |message, peer| {
        Box::pin(handler(message, peer)) as Pin<Box<dyn Future<Output = Option<String>> + Send>>
    })
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker tasks draining the connection queue; also the queue capacity.
    pub max_workers: usize,
    /// Identifier reported in the `HELO` response.
    pub node_id: String,
    /// When false, `KILL_SERVICE` stops the serve loop instead of exiting the
    /// process. Tests rely on this.
    pub exit_on_kill: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            node_id: "0".to_string(),
            exit_on_kill: true,
        }
    }
}

/// TCP server with a bounded worker pool.
///
/// The accept loop is the only producer into the connection queue. Each worker
/// fully owns one connection for its lifetime: read the full message, dispatch
/// it, write the response, close.
pub struct PooledServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: MessageHandlerFn,
    config: ServerConfig,
}

impl PooledServer {
    /// Binds the listener. A taken address is a fatal startup error.
    pub async fn bind(
        addr: SocketAddr,
        config: ServerConfig,
        handler: MessageHandlerFn,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            handler,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until `KILL_SERVICE` is received.
    pub async fn serve(self) -> Result<()> {
        let (conn_tx, conn_rx) = mpsc::channel::<(TcpStream, SocketAddr)>(self.config.max_workers);
        let conn_rx = Arc::new(tokio::sync::Mutex::new(conn_rx));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        for worker_id in 0..self.config.max_workers {
            let conn_rx = conn_rx.clone();
            let handler = self.handler.clone();
            let config = self.config.clone();
            let shutdown_tx = shutdown_tx.clone();

            tokio::spawn(async move {
                loop {
                    let next = { conn_rx.lock().await.recv().await };
                    let Some((stream, peer)) = next else {
                        break;
                    };

                    if let Err(e) =
                        handle_connection(stream, peer, &handler, &config, &shutdown_tx).await
                    {
                        tracing::warn!("Worker {}: connection from {} failed: {}", worker_id, peer, e);
                    }
                }
            });
        }

        tracing::info!(
            "Listening on {} with {} workers",
            self.local_addr,
            self.config.max_workers
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    match conn_tx.try_send((stream, peer)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(conn)) => {
                            // Shed rather than queue: closing protects the
                            // accept loop from unbounded backlog.
                            tracing::warn!("Queue full, closing connection from {}", conn.1);
                            drop(conn);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("Shutting down listener on {}", self.local_addr);
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: &MessageHandlerFn,
    config: &ServerConfig,
    shutdown_tx: &watch::Sender<bool>,
) -> Result<()> {
    let message = read_message(&mut stream).await?;
    if message.is_empty() {
        return Ok(());
    }

    if message == KILL_MESSAGE {
        tracing::info!("Killing service on request from {}", peer);
        if config.exit_on_kill {
            std::process::exit(0);
        }
        let _ = shutdown_tx.send(true);
        return Ok(());
    }

    let response = if let Some(token) = message.strip_prefix("HELO ") {
        Some(helo_response(token, peer, &config.node_id))
    } else {
        (handler)(message.clone(), peer).await
    };

    match response {
        Some(response) => stream.write_all(response.as_bytes()).await?,
        None => {
            tracing::debug!("Unrecognized message from {}: {:?}", peer, message);
            stream.write_all(INVALID_RESPONSE.as_bytes()).await?;
        }
    }
    stream.shutdown().await?;

    Ok(())
}

fn helo_response(token: &str, peer: SocketAddr, node_id: &str) -> String {
    let token = token.trim_end().split_whitespace().next().unwrap_or("");
    format!(
        "HELO {}\nIP:{}\nPort:{}\nStudentID:{}",
        token,
        peer.ip(),
        peer.port(),
        node_id
    )
}

/// Reads until the blank-line terminator, accumulating partial reads.
///
/// Also stops at EOF and on the two unterminated built-in forms
/// (`KILL_SERVICE\n`, `HELO ...\n`), which the original wire contract frames
/// by a single newline only.
pub async fn read_message(stream: &mut TcpStream) -> Result<String> {
    let mut message = String::new();
    let mut buf = [0u8; READ_BUFFER];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        message.push_str(&String::from_utf8_lossy(&buf[..n]));

        if message.contains(MESSAGE_TERMINATOR)
            || message == KILL_MESSAGE
            || (message.starts_with("HELO ") && message.ends_with('\n'))
        {
            break;
        }
    }

    Ok(message)
}
