//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Read until the end of the request head.
async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a backend that answers every request with `200`. The body is the
/// backend's name followed by the raw request head it received.
pub async fn start_mock_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_request_head(&mut socket).await;
                let body = format!("{name}\n{head}");
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that redirects every request to `http://{own addr}/next?x=1`.
pub async fn start_redirect_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request_head(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 302 Found\r\n\
                     Location: http://{addr}/next?x=1\r\n\
                     Content-Length: 0\r\n\
                     Connection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that reads the request and never answers.
pub async fn start_hanging_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request_head(&mut socket).await;
                std::future::pending::<()>().await;
            });
        }
    });

    addr
}

/// WebSocket server standing in for the session orchestrator.
pub struct MockOrchestrator {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<WebSocketStream<TcpStream>>,
}

impl MockOrchestrator {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(socket).await {
                    if tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        });

        Self { addr, connections }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/proxy-hub", self.addr)
    }

    /// Wait for the proxy to connect.
    pub async fn accept(&mut self) -> WebSocketStream<TcpStream> {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("proxy did not connect in time")
            .expect("orchestrator listener stopped")
    }
}

pub fn session_event(kind: &str, token: &str, internal_uri: &str) -> String {
    json!({
        "type": kind,
        "payload": {
            "contentToken": token,
            "internalUri": internal_uri,
            "publicUri": "http://portal.example.com/report",
            "requestingHost": "portal.example.com"
        }
    })
    .to_string()
}

pub async fn send_text(ws: &mut WebSocketStream<TcpStream>, text: String) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

/// Next JSON text frame from the proxy.
pub async fn next_report(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no report in time")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
