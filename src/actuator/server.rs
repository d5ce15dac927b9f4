//! WebSocket endpoint on the robot side
//!
//! Every client gets its own task. Text frames are decoded as
//! [`WireMessage`]s and folded into one shared [`ActuatorState`]; frames that do
//! not decode are logged and skipped without dropping the client.

use super::state::ActuatorState;
use crate::link::WireMessage;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SHUTDOWN_REASON: &str = "Server shutting down";
// Upper bound on waiting for a client to answer our close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running actuator endpoint
#[derive(Debug)]
pub struct ActuatorServer {
    local_addr: SocketAddr,
    state: watch::Receiver<ActuatorState>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ActuatorServer {
    /// Binds `addr` and starts accepting clients
    pub async fn bind(addr: &str) -> Result<Self, ActuatorError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ActuatorError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Robot listening on ws://{}", local_addr);

        let (state_tx, state_rx) = watch::channel(ActuatorState::default());
        let token = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, Arc::new(state_tx), token.clone()));

        Ok(Self {
            local_addr,
            state: state_rx,
            token,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ActuatorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActuatorState> {
        self.state.clone()
    }

    /// Closes every client with "going away" and stops listening
    pub async fn shutdown(mut self) {
        info!("Shutting down robot endpoint");
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Accept loop panicked: {}", e);
            }
        }
    }
}

impl Drop for ActuatorServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<watch::Sender<ActuatorState>>,
    token: CancellationToken,
) {
    let mut clients = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    clients.spawn(serve_client(stream, peer, state.clone(), token.clone()));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            Some(finished) = clients.join_next(), if !clients.is_empty() => {
                if let Err(e) = finished {
                    error!("Client task failed: {}", e);
                }
            }
        }
    }

    drop(listener);
    while let Some(finished) = clients.join_next().await {
        if let Err(e) = finished {
            error!("Client task failed: {}", e);
        }
    }
    info!("Robot endpoint stopped");
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<watch::Sender<ActuatorState>>,
    token: CancellationToken,
) {
    let mut socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    info!("Client connected: {}", peer);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Away,
                    reason: SHUTDOWN_REASON.into(),
                };
                if let Err(e) = socket.send(Message::Close(Some(frame))).await {
                    debug!("Close frame to {} not delivered: {}", peer, e);
                    break;
                }
                // Let the client acknowledge so its side sees a clean 1001
                let drain = async { while let Some(Ok(_)) = socket.next().await {} };
                if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
                    debug!("Client {} did not acknowledge close", peer);
                }
                break;
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => apply_frame(&text, &state, peer),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Client {} closed: {:?}", peer, frame);
                    break;
                }
                Some(Ok(other)) => debug!("Ignoring frame from {}: {:?}", peer, other),
                Some(Err(e)) => {
                    warn!("Connection error with {}: {}", peer, e);
                    break;
                }
                None => break,
            },
        }
    }
    info!("Client disconnected: {}", peer);
}

fn apply_frame(text: &str, state: &watch::Sender<ActuatorState>, peer: SocketAddr) {
    match serde_json::from_str::<WireMessage>(text) {
        Ok(message) => {
            debug!("Received from {}: {:?}", peer, message);
            state.send_modify(|state| state.apply(&message));
        }
        Err(e) => warn!("Error handling message from {}: {}", peer, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    async fn start() -> ActuatorServer {
        ActuatorServer::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let server = start().await;
        let taken = server.local_addr().to_string();
        let result = ActuatorServer::bind(&taken).await;
        assert!(matches!(result, Err(ActuatorError::Bind { .. })));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn applies_and_clamps_commands() {
        let server = start().await;
        let mut state = server.subscribe();
        let (mut client, _) = connect_async(format!("ws://{}", server.local_addr()))
            .await
            .unwrap();

        client
            .send(Message::text(r#"{"type":"speed","value":150}"#))
            .await
            .unwrap();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| s.last_update.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.speed, 100.0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_frames_do_not_drop_the_client() {
        let server = start().await;
        let mut state = server.subscribe();
        let (mut client, _) = connect_async(format!("ws://{}", server.local_addr()))
            .await
            .unwrap();

        client.send(Message::text("{broken")).await.unwrap();
        client
            .send(Message::text(r#"{"type":"warp","value":9}"#))
            .await
            .unwrap();
        client
            .send(Message::text(r#"{"type":"direction","x":-20.5,"y":40}"#))
            .await
            .unwrap();

        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| s.last_update.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.direction.x, -20.5);
        assert_eq!(snapshot.direction.y, 40.0);
        assert_eq!(snapshot.speed, 0.0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_clients_with_going_away() {
        let server = start().await;
        let (mut client, _) = connect_async(format!("ws://{}", server.local_addr()))
            .await
            .unwrap();

        // Make sure the server side is up before tearing it down
        client
            .send(Message::text(r#"{"type":"speed","value":1}"#))
            .await
            .unwrap();
        server
            .subscribe()
            .wait_for(|s| s.last_update.is_some())
            .await
            .unwrap();

        let shutdown = tokio::spawn(server.shutdown());
        let close = loop {
            match client.next().await {
                Some(Ok(Message::Close(frame))) => break frame,
                Some(Ok(_)) => continue,
                other => panic!("expected a close frame, got {:?}", other),
            }
        };
        assert_eq!(close.map(|f| u16::from(f.code)), Some(1001));
        shutdown.await.unwrap();
    }
}
