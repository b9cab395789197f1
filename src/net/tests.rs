//! Transport Layer Tests
//!
//! Exercises framing, built-in message handling and the shedding policy of
//! the bounded worker pool against real sockets on ephemeral ports.

#[cfg(test)]
mod tests {
    use crate::net::client::send_request;
    use crate::net::server::{handler_fn, PooledServer, ServerConfig};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config() -> ServerConfig {
        ServerConfig {
            max_workers: 4,
            node_id: "test-node".to_string(),
            exit_on_kill: false,
        }
    }

    async fn spawn_echo_server(config: ServerConfig) -> SocketAddr {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handler = handler_fn(|message: String, _peer| async move {
            if message.starts_with("ECHO: ") {
                Some(message)
            } else {
                None
            }
        });
        let server = PooledServer::bind(bind, config, handler).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move {
            server.serve().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let addr = spawn_echo_server(test_config()).await;

        let response = send_request(&addr.ip().to_string(), addr.port(), "ECHO: hello\n\n")
            .await
            .unwrap();
        assert_eq!(response, "ECHO: hello\n\n");
    }

    #[tokio::test]
    async fn test_unrecognized_message_gets_error() {
        let addr = spawn_echo_server(test_config()).await;

        let response = send_request(&addr.ip().to_string(), addr.port(), "NONSENSE\n\n")
            .await
            .unwrap();
        assert_eq!(response, "ERROR: INVALID MESSAGE\n\n");
    }

    #[tokio::test]
    async fn test_helo_reports_peer_and_node_id() {
        let addr = spawn_echo_server(test_config()).await;

        let response = send_request(&addr.ip().to_string(), addr.port(), "HELO text\n")
            .await
            .unwrap();

        let lines: Vec<&str> = response.lines().collect();
        assert_eq!(lines[0], "HELO text");
        assert!(lines[1].starts_with("IP:127.0.0.1"));
        assert!(lines[2].starts_with("Port:"));
        assert_eq!(lines[3], "StudentID:test-node");
    }

    #[tokio::test]
    async fn test_message_split_across_writes_is_accumulated() {
        let addr = spawn_echo_server(test_config()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"ECHO: part").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(b"ial\n\n").await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "ECHO: partial\n\n");
    }

    #[tokio::test]
    async fn test_saturated_pool_sheds_new_connections() {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = ServerConfig {
            max_workers: 1,
            node_id: "test-node".to_string(),
            exit_on_kill: false,
        };
        // Slow handler keeps the single worker busy.
        let handler = handler_fn(|_message: String, _peer| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Some("OK\n\n".to_string())
        });
        let server = PooledServer::bind(bind, config, handler).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move {
            server.serve().await.unwrap();
        });

        // First connection occupies the worker, second fills the queue.
        let mut busy = TcpStream::connect(addr).await.unwrap();
        busy.write_all(b"X\n\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut queued = TcpStream::connect(addr).await.unwrap();
        queued.write_all(b"X\n\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Third connection must be closed without any response.
        let mut shed = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut buf = Vec::new();
        // A reset from the shed side also counts as "closed".
        let n = shed.read_to_end(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0, "shed connection should be closed immediately");
    }

    #[tokio::test]
    async fn test_kill_service_stops_the_listener() {
        let addr = spawn_echo_server(test_config()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"KILL_SERVICE\n").await.unwrap();
        stream.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(
            TcpStream::connect(addr).await.is_err(),
            "listener should be gone after KILL_SERVICE"
        );
    }
}
