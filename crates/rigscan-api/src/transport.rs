//! One-shot TCP transport.
//!
//! Each call opens a fresh connection, writes the payload, reads until the
//! peer closes, then drops the socket. Miners do not keep sessions alive
//! reliably, so nothing is pooled.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const READ_CHUNK: usize = 4096;

/// Send `payload` and return whatever the device wrote back.
///
/// A connection that cannot be established yields an empty vector. A read
/// that fails part way yields the bytes received so far. `limit` bounds the
/// connect and each individual read.
pub async fn send(ip: IpAddr, port: u16, payload: &[u8], limit: Duration) -> Vec<u8> {
    let addr = SocketAddr::new(ip, port);

    let mut stream = match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(ip = %ip, port, error = %e, "API connection failed");
            return Vec::new();
        }
        Err(_) => {
            tracing::warn!(ip = %ip, port, "API connection timeout expired");
            return Vec::new();
        }
    };

    if let Err(e) = stream.write_all(payload).await {
        tracing::warn!(ip = %ip, error = %e, "API write failed");
        return Vec::new();
    }
    if let Err(e) = stream.flush().await {
        tracing::warn!(ip = %ip, error = %e, "API flush failed");
        return Vec::new();
    }

    let mut data = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match timeout(limit, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => data.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => {
                tracing::warn!(ip = %ip, error = %e, received = data.len(), "API read error");
                break;
            }
            Err(_) => {
                tracing::warn!(ip = %ip, received = data.len(), "API read timed out");
                break;
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_send_reads_until_close() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 64];
            let n = sock.read(&mut req).await.unwrap();
            assert_eq!(&req[..n], b"ping");
            // Large enough to span several reads.
            let reply = vec![b'x'; 10_000];
            sock.write_all(&reply).await.unwrap();
        });

        let data = send(LOCALHOST, port, b"ping", Duration::from_secs(2)).await;
        assert_eq!(data.len(), 10_000);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_empty() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let data = send(LOCALHOST, port, b"ping", Duration::from_millis(500)).await;
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_peer_returns_partial_data() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"{\"partial\":").await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let data = send(LOCALHOST, port, b"ping", Duration::from_millis(100)).await;
        assert_eq!(data, b"{\"partial\":");
        server.await.unwrap();
    }
}
