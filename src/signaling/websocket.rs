// WebSocket signaling endpoint
// One reader loop per socket drives the registration/routing protocol; a
// dedicated writer task owns the sink so frames to a peer leave in order.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::message::{
    ErrorNotice, InboundMessage, Target, ERR_INVALID_REGISTRATION_JSON, ERR_REGISTRATION_REQUIRED,
};
use super::registry::{ConnectionHandle, ConnectionId, Registry};
use super::server::AppState;

/// How long queued frames get to reach a departing client
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the reader loop keeps going after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    /// Waiting for the mandatory registration message
    Unregistered,
    Registered { client_id: String },
}

/// Protocol state for one accepted connection
pub struct Session {
    registry: Registry,
    conn: ConnectionId,
    tx: UnboundedSender<Message>,
    state: SessionState,
}

impl Session {
    pub fn new(registry: Registry, conn: ConnectionId, tx: UnboundedSender<Message>) -> Self {
        Self {
            registry,
            conn,
            tx,
            state: SessionState::Unregistered,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    pub fn client_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Registered { client_id } => Some(client_id),
            SessionState::Unregistered => None,
        }
    }

    /// Handle one inbound text frame
    pub async fn handle_text(&mut self, text: String) -> Step {
        let message = InboundMessage::parse(text);
        match self.state {
            SessionState::Unregistered => self.handle_registration(message).await,
            SessionState::Registered { .. } => {
                self.route(message).await;
                Step::Continue
            },
        }
    }

    async fn handle_registration(&mut self, message: InboundMessage) -> Step {
        let Some(client_id) = message.registration_id().map(str::to_string) else {
            let reason = match message {
                InboundMessage::Unparsed { .. } => ERR_INVALID_REGISTRATION_JSON,
                InboundMessage::Parsed { .. } => ERR_REGISTRATION_REQUIRED,
            };
            tracing::warn!(connection_id = %self.conn, reason, "Rejecting unregistered connection");
            self.reject(reason);
            return Step::Close;
        };

        match self.registry.register(&client_id, self.conn).await {
            Ok(()) => {
                tracing::info!(client_id = %client_id, connection_id = %self.conn, "Registered client");
                self.state = SessionState::Registered { client_id };
                Step::Continue
            },
            Err(e) => {
                // Pruned by a failed send before it could register
                crate::log_error!(e, "register");
                Step::Close
            },
        }
    }

    async fn route(&self, message: InboundMessage) {
        match message {
            InboundMessage::Parsed {
                kind, target, raw, ..
            } if kind.is_routable() => match target {
                Target::Client(target) => {
                    if !self.registry.send_to(&target, &raw).await {
                        tracing::debug!(
                            from = self.client_id().unwrap_or_default(),
                            target = %target,
                            kind = kind.as_str(),
                            "Target unavailable, message dropped"
                        );
                    }
                },
                Target::Invalid => {
                    tracing::debug!(
                        from = self.client_id().unwrap_or_default(),
                        kind = kind.as_str(),
                        "Target is not a client id, message dropped"
                    );
                },
                Target::Absent => {
                    self.registry.broadcast(&raw, self.conn).await;
                },
            },
            other => {
                tracing::debug!(connection_id = %self.conn, "Echoing unrouted message");
                let _ = self.tx.send(Message::Text(other.into_raw()));
            },
        }
    }

    /// Handle one inbound binary frame
    pub fn handle_binary(&mut self, len: usize) -> Step {
        match self.state {
            SessionState::Unregistered => {
                tracing::warn!(connection_id = %self.conn, len, "Binary frame before registration");
                self.reject(ERR_REGISTRATION_REQUIRED);
                Step::Close
            },
            SessionState::Registered { .. } => {
                tracing::debug!(connection_id = %self.conn, len, "Ignoring binary frame");
                Step::Continue
            },
        }
    }

    /// Queue an error notification followed by a close frame
    fn reject(&self, reason: &'static str) {
        let _ = self
            .tx
            .send(Message::Text(ErrorNotice::new(reason).to_json()));
        let _ = self.tx.send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })));
    }
}

/// Handle signaling WebSocket upgrades
pub async fn handle_signaling_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_signaling_socket(socket, state.registry, state.heartbeat_interval)
    })
}

async fn handle_signaling_socket(socket: WebSocket, registry: Registry, heartbeat: Duration) {
    let (sender, receiver) = socket.split();
    let (tx, rx) = unbounded_channel();

    let mut send_task = tokio::spawn(write_loop(sender, rx));
    let conn = registry.accept(ConnectionHandle::new(tx.clone())).await;
    let heartbeat_task = tokio::spawn(heartbeat_loop(tx.clone(), heartbeat, conn));
    let session = Session::new(registry.clone(), conn, tx);

    // Whichever side ends first ends the connection
    let writer_finished = tokio::select! {
        _ = read_loop(session, receiver) => false,
        _ = &mut send_task => true,
    };

    heartbeat_task.abort();
    registry.disconnect(conn).await;

    if !writer_finished && !flush_writer(&mut send_task, FLUSH_TIMEOUT).await {
        tracing::debug!(connection_id = %conn, "Timed out flushing outbound frames");
    }
    tracing::info!(connection_id = %conn, "Connection closed");
}

/// Give the writer `limit` to drain its queue, aborting it otherwise so the
/// socket is released. Returns whether the writer finished on its own.
async fn flush_writer(send_task: &mut JoinHandle<()>, limit: Duration) -> bool {
    if tokio::time::timeout(limit, &mut *send_task).await.is_ok() {
        return true;
    }
    send_task.abort();
    false
}

async fn read_loop(mut session: Session, mut receiver: SplitStream<WebSocket>) {
    while let Some(frame) = receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(connection_id = %session.connection_id(), "WebSocket error: {}", e);
                break;
            },
        };

        match msg {
            Message::Text(text) => {
                tracing::trace!(connection_id = %session.connection_id(), "Received: {}", text);
                if session.handle_text(text).await == Step::Close {
                    break;
                }
            },
            Message::Binary(data) => {
                if session.handle_binary(data.len()) == Step::Close {
                    break;
                }
            },
            Message::Close(_) => break,
            _ => {},
        }
    }
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

async fn heartbeat_loop(tx: UnboundedSender<Message>, period: Duration, conn: ConnectionId) {
    let mut interval = tokio::time::interval(period);
    // First tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        if tx.send(Message::Ping(Vec::new())).is_err() {
            break;
        }
        tracing::trace!(connection_id = %conn, "Sent heartbeat ping");
    }
}
