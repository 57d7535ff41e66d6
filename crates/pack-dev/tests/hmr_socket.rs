//! The `/__hmr` endpoint over a real socket.

use pack_core::{HmrMessage, HotUpdateSink};
use pack_dev::{router, HmrHub};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HANDSHAKE: &str = "GET /__hmr HTTP/1.1\r\n\
Host: localhost\r\n\
Connection: Upgrade\r\n\
Upgrade: websocket\r\n\
Sec-WebSocket-Version: 13\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Protocol: pack-hmr\r\n\
\r\n";

/// Read until the HTTP response head is complete; returns it and any bytes after it.
async fn read_head(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed during handshake");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = buf.split_off(end + 4);
            return (String::from_utf8(buf).unwrap(), rest);
        }
    }
}

/// Read one unmasked server text frame with a short payload.
async fn read_text(stream: &mut TcpStream, pending: &mut Vec<u8>) -> String {
    let mut chunk = [0u8; 1024];
    loop {
        if pending.len() >= 2 {
            assert_eq!(pending[0], 0x81, "expected a final text frame");
            let len = usize::from(pending[1]);
            assert!(len < 126);
            if pending.len() >= 2 + len {
                let frame: Vec<u8> = pending.drain(..2 + len).collect();
                return String::from_utf8(frame[2..].to_vec()).unwrap();
            }
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before frame");
        pending.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test]
async fn client_is_greeted_then_receives_broadcasts() {
    let hub = HmrHub::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(hub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(HANDSHAKE.as_bytes()).await.unwrap();

    let (head, mut pending) = tokio::time::timeout(Duration::from_secs(5), read_head(&mut stream))
        .await
        .unwrap();
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");
    assert!(head.to_ascii_lowercase().contains("sec-websocket-protocol: pack-hmr"));

    let greeting = tokio::time::timeout(Duration::from_secs(5), read_text(&mut stream, &mut pending))
        .await
        .unwrap();
    assert_eq!(greeting, r#"{"type":"connected"}"#);
    assert_eq!(hub.clients(), 1);

    hub.send(&HmrMessage::Reload);
    let reload = tokio::time::timeout(Duration::from_secs(5), read_text(&mut stream, &mut pending))
        .await
        .unwrap();
    assert_eq!(reload, r#"{"type":"reload"}"#);
}
