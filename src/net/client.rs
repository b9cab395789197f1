use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::server::MESSAGE_TERMINATOR;

/// Sends one framed request and reads the full response.
///
/// Opens a fresh connection, writes the payload, half-closes the write side
/// and accumulates the response until the blank-line terminator or EOF.
pub async fn send_request(host: &str, port: u16, payload: &str) -> Result<String> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        response.push_str(&String::from_utf8_lossy(&buf[..n]));
        if response.contains(MESSAGE_TERMINATOR) {
            break;
        }
    }

    Ok(response)
}
