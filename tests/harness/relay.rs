//! In-process WebSocket relay speaking the client wire protocol.
//!
//! Accepts connections sequentially on a random local port, answers the
//! `connect` handshake, records every client frame, and lets tests push
//! server frames toward the client or kick the current connection to
//! exercise reconnect handling.

use futures_util::{SinkExt, StreamExt};
use meshcall::signaling::protocol::{ClientFrame, ServerFrame};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

/// Handle to the in-process relay
pub struct TestRelay {
    addr: SocketAddr,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
    push: mpsc::UnboundedSender<ServerFrame>,
    kick: mpsc::UnboundedSender<()>,
}

impl TestRelay {
    /// Bind a random port and start serving connections
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test relay");
        let addr = listener.local_addr().expect("relay local addr");

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (kick_tx, kick_rx) = mpsc::unbounded_channel();

        let push_rx = Arc::new(Mutex::new(push_rx));
        let kick_rx = Arc::new(Mutex::new(kick_rx));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                serve(ws, frames_tx.clone(), push_rx.clone(), kick_rx.clone()).await;
            }
        });

        Self {
            addr,
            frames,
            push: push_tx,
            kick: kick_tx,
        }
    }

    /// WebSocket URL clients should dial
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Deliver a server frame to the connected client
    pub fn push(&self, frame: ServerFrame) {
        self.push.send(frame).expect("relay serving task gone");
    }

    /// Drop the current connection without a close handshake
    pub fn kick(&self) {
        self.kick.send(()).expect("relay serving task gone");
    }

    /// Next frame the client sent, with a deadline
    pub async fn next_frame(&mut self) -> ClientFrame {
        super::recv_timeout(&mut self.frames).await
    }
}

async fn serve(
    mut ws: WebSocketStream<TcpStream>,
    frames: mpsc::UnboundedSender<ClientFrame>,
    push: Arc<Mutex<mpsc::UnboundedReceiver<ServerFrame>>>,
    kick: Arc<Mutex<mpsc::UnboundedReceiver<()>>>,
) {
    let mut push = push.lock().await;
    let mut kick = kick.lock().await;

    loop {
        tokio::select! {
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame: ClientFrame =
                            serde_json::from_str(&text).expect("client sent malformed frame");
                        if matches!(frame, ClientFrame::Connect { .. }) {
                            let ack = serde_json::to_string(&ServerFrame::Connected)
                                .expect("serialize connected");
                            if ws.send(Message::Text(ack)).await.is_err() {
                                return;
                            }
                        }
                        let _ = frames.send(frame);
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
            frame = push.recv() => {
                let Some(frame) = frame else { return };
                let json = serde_json::to_string(&frame).expect("serialize server frame");
                if ws.send(Message::Text(json)).await.is_err() {
                    return;
                }
            }
            _ = kick.recv() => return,
        }
    }
}
