use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::SignalingError;
use crate::signaller::{Dialer, Link, LinkEvent};

/// Serves the canned `(status, body)` responses, one connection each, in
/// order. The task resolves to the raw requests it received.
pub async fn serve(responses: Vec<(u16, String)>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                if status < 300 { "OK" } else { "Error" },
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });
    (addr, server)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Accepts connections and never answers them. Counts the connections.
pub async fn hang() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            open.push(socket);
        }
    });
    (addr, accepted)
}

/// The server side of an in-memory link.
pub struct RemoteEnd {
    pub events: UnboundedSender<LinkEvent>,
    pub received: UnboundedReceiver<String>,
}

impl RemoteEnd {
    pub fn drain(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(message) = self.received.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn reply(&self, text: impl Into<String>) {
        self.events.send(LinkEvent::Message(text.into())).unwrap();
    }
}

/// Dials in-memory links, refusing the first `failures` dials.
pub struct MemoryDialer {
    dials: AtomicUsize,
    failures_left: AtomicUsize,
    remotes: UnboundedSender<RemoteEnd>,
}

impl MemoryDialer {
    pub fn new(failures: usize) -> (Arc<Self>, UnboundedReceiver<RemoteEnd>) {
        let (remotes, receiver) = mpsc::unbounded_channel();
        let dialer = Arc::new(Self {
            dials: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
            remotes,
        });
        (dialer, receiver)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, _url: &Url) -> Result<Link, SignalingError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SignalingError::Transport("refused".into()));
        }
        let (outbound, received) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        self.remotes
            .send(RemoteEnd { events, received })
            .expect("test dropped remotes");
        Ok(Link { outbound, inbound })
    }
}
