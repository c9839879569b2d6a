//! WebSocket connection handling
//!
//! One actor per connection: the reader loop processes frames in arrival
//! order, delegates turns to the pipeline, and buffers non-turn control
//! frames while a turn is in flight. A dedicated writer task owns the sink
//! and drains the connection's bounded outbound queue, so reply frames are
//! never interleaved.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use voice_gateway_core::{Identity, Role};

use crate::frames::{parse_client_frame, ClientFrame, ServerFrame};
use crate::metrics;
use crate::registry::{CloseReason, ConnectionSender};
use crate::state::AppState;
use crate::turn::TurnInput;

/// Turn state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingAudio,
    Processing,
    Closed,
}

/// Per-connection mutable state, owned by the reader loop
#[derive(Debug)]
pub struct ConnState {
    pub identity: Identity,
    pub authenticated: bool,
    pub chat_id: Option<String>,
    pub turn: TurnState,
}

impl ConnState {
    pub fn new(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Self {
                identity,
                authenticated: true,
                chat_id: None,
                turn: TurnState::Idle,
            },
            None => Self {
                identity: Identity::anonymous(),
                authenticated: false,
                chat_id: None,
                turn: TurnState::Idle,
            },
        }
    }

    /// Guards checked before any turn begins
    pub fn turn_guard(&self, require_auth: bool) -> Result<(), &'static str> {
        if require_auth && !self.authenticated {
            return Err("Authentication required");
        }
        if self.chat_id.is_none() {
            return Err("No active chat session");
        }
        Ok(())
    }

    /// `start_stream` is advisory: Idle -> AwaitingAudio, no-op otherwise
    pub fn on_start_stream(&mut self) {
        if self.turn == TurnState::Idle {
            self.turn = TurnState::AwaitingAudio;
        }
    }

    pub fn begin_turn(&mut self) {
        self.turn = TurnState::Processing;
    }

    pub fn complete_turn(&mut self) {
        if self.turn == TurnState::Processing {
            self.turn = TurnState::Idle;
        }
    }
}

/// What to do with a control frame given the current turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundAction {
    /// Apply now
    Handle,
    /// Hold until the in-flight turn completes
    Buffer,
    /// Reject with `error: Busy`
    RejectBusy,
}

/// Route a parsed control frame against the turn state
///
/// While a turn is processing, turn-initiating frames are rejected and
/// everything else is buffered (up to `pending_limit`).
pub fn inbound_action(
    turn: TurnState,
    frame: &ClientFrame,
    pending_len: usize,
    pending_limit: usize,
) -> InboundAction {
    if turn != TurnState::Processing {
        return InboundAction::Handle;
    }
    if frame.is_turn_initiating() {
        return InboundAction::RejectBusy;
    }
    if pending_len >= pending_limit {
        return InboundAction::RejectBusy;
    }
    InboundAction::Buffer
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Handle a WebSocket upgrade at `/`
///
/// The bearer token rides in the `token` query parameter. With
/// `require_auth` set, a missing or invalid token rejects the upgrade with
/// 401; otherwise the connection proceeds anonymously and privileged
/// actions are refused later.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    metrics::record_request("ws_upgrade");

    let identity = match params.token.as_deref() {
        Some(token) => match state.verifier.verify(token).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!(error = %e, "Upgrade token rejected");
                None
            },
        },
        None => None,
    };

    if state.settings.server.require_auth && identity.is_none() {
        metrics::record_error("unauthorized_upgrade");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Reader-loop outcome for one inbound message
enum Flow {
    Continue,
    Break,
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let conn_id = Uuid::new_v4().to_string();
    let (sink, stream) = socket.split();

    let (frames_tx, frames_rx) = mpsc::channel(state.settings.server.send_queue_depth);
    let (close_tx, close_rx) = mpsc::channel(1);
    let writer = tokio::spawn(write_loop(sink, frames_rx, close_rx));

    let sender = ConnectionSender::new(&conn_id, frames_tx, close_tx);
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    metrics::connection_opened();
    let mut actor = ConnectionActor {
        state,
        conn_id: conn_id.clone(),
        sender: sender.clone(),
        conn: ConnState::new(identity),
        pending: VecDeque::new(),
        turn_task: None,
        done_tx,
        registered_user: None,
    };

    tracing::info!(
        conn_id = %conn_id,
        authenticated = actor.conn.authenticated,
        user_id = %actor.conn.identity.user_id,
        "Connection established"
    );

    let _ = actor.sender.send(&ServerFrame::ConnectionEstablished {
        message: "Connected to voice gateway".to_string(),
        authenticated: actor.conn.authenticated,
    });

    if actor.conn.authenticated {
        actor
            .state
            .registry
            .add(&actor.conn.identity.user_id, sender.clone());
        actor.registered_user = Some(actor.conn.identity.user_id.clone());
    }

    let mut stream: SplitStream<WebSocket> = stream;
    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(message)) => {
                        if matches!(actor.on_message(message).await, Flow::Break) {
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                        break;
                    },
                    None => break,
                }
            },
            Some(()) = done_rx.recv() => {
                actor.on_turn_done().await;
            },
        }
    }

    // Closing the connection cancels any in-flight turn; persistence is
    // cancellation-safe because message ids are assigned before the write.
    if let Some(task) = actor.turn_task.take() {
        task.abort();
    }
    if let Some(user_id) = actor.registered_user.take() {
        actor.state.registry.remove(&user_id, &conn_id);
    }
    actor.conn.turn = TurnState::Closed;

    drop(actor);
    drop(sender);
    let _ = writer.await;

    metrics::connection_closed();
    tracing::info!(conn_id = %conn_id, "Connection closed");
}

/// Writer task: sole owner of the sink
///
/// Ends when the outbound queue closes (normal teardown) or a close is
/// requested (backpressure policy violation).
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Message>,
    mut close: mpsc::Receiver<CloseReason>,
) {
    loop {
        tokio::select! {
            maybe = frames.recv() => match maybe {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                },
                None => break,
            },
            Some(reason) = close.recv() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: reason.close_code(),
                        reason: reason.as_str().into(),
                    })))
                    .await;
                break;
            },
        }
    }
}

struct ConnectionActor {
    state: AppState,
    conn_id: String,
    sender: ConnectionSender,
    conn: ConnState,
    pending: VecDeque<ClientFrame>,
    turn_task: Option<JoinHandle<()>>,
    done_tx: mpsc::Sender<()>,
    registered_user: Option<String>,
}

impl ConnectionActor {
    async fn on_message(&mut self, message: Message) -> Flow {
        match message {
            Message::Text(text) => self.on_text(&text).await,
            Message::Binary(data) => self.on_binary(data).await,
            Message::Ping(data) => match self.sender.send_message(Message::Pong(data)) {
                Ok(()) => Flow::Continue,
                Err(_) => Flow::Break,
            },
            Message::Pong(_) => Flow::Continue,
            Message::Close(_) => Flow::Break,
        }
    }

    async fn on_text(&mut self, text: &str) -> Flow {
        let frame = match parse_client_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(conn_id = %self.conn_id, "Rejected inbound frame: {:?}", e);
                metrics::record_error("protocol");
                return self.reply(ServerFrame::error(e.reply_text()));
            },
        };

        match inbound_action(
            self.conn.turn,
            &frame,
            self.pending.len(),
            self.state.settings.server.pending_frame_limit,
        ) {
            InboundAction::Handle => self.apply_control(frame).await,
            InboundAction::Buffer => {
                self.pending.push_back(frame);
                Flow::Continue
            },
            InboundAction::RejectBusy => self.reply(ServerFrame::error("Busy")),
        }
    }

    async fn on_binary(&mut self, data: Vec<u8>) -> Flow {
        if self.conn.turn == TurnState::Processing {
            return self.reply(ServerFrame::error("Busy"));
        }
        if let Err(reason) = self.conn.turn_guard(self.state.settings.server.require_auth) {
            return self.reply(ServerFrame::error(reason));
        }
        self.start_turn(TurnInput::Voice(data));
        Flow::Continue
    }

    async fn apply_control(&mut self, frame: ClientFrame) -> Flow {
        match frame {
            ClientFrame::Auth { token } => self.on_auth(&token).await,
            ClientFrame::UserInfo { user_id } => {
                if self.conn.authenticated {
                    tracing::debug!(conn_id = %self.conn_id, "Ignoring user_info on authenticated connection");
                } else {
                    self.conn.identity = Identity::new(user_id.clone(), Role::User);
                    self.reregister(user_id);
                }
                Flow::Continue
            },
            ClientFrame::SetChatId { chat_id } => {
                tracing::debug!(conn_id = %self.conn_id, chat_id = %chat_id, "Bound chat session");
                self.conn.chat_id = Some(chat_id);
                Flow::Continue
            },
            ClientFrame::StartStream => {
                self.conn.on_start_stream();
                Flow::Continue
            },
            ClientFrame::EndStream => Flow::Continue,
            ClientFrame::ClearContext => {
                tracing::debug!(conn_id = %self.conn_id, "Ignoring deprecated clear_context");
                Flow::Continue
            },
            ClientFrame::TextMessage { text } => {
                if let Err(reason) = self.conn.turn_guard(self.state.settings.server.require_auth) {
                    return self.reply(ServerFrame::error(reason));
                }
                if text.trim().is_empty() {
                    return self.reply(ServerFrame::error("Empty message"));
                }
                self.start_turn(TurnInput::Text(text));
                Flow::Continue
            },
        }
    }

    async fn on_auth(&mut self, token: &str) -> Flow {
        match self.state.verifier.verify(token).await {
            Ok(identity) => {
                let user_id = identity.user_id.clone();
                self.conn.identity = identity;
                self.conn.authenticated = true;
                self.reregister(user_id.clone());
                self.reply(ServerFrame::AuthSuccess { user_id })
            },
            Err(e) => {
                metrics::record_error("auth");
                self.reply(ServerFrame::AuthError {
                    error: e.to_string(),
                })
            },
        }
    }

    /// Move this connection's registry entry to a (possibly new) user id
    fn reregister(&mut self, user_id: String) {
        if self.registered_user.as_deref() == Some(user_id.as_str()) {
            return;
        }
        if let Some(previous) = self.registered_user.take() {
            self.state.registry.remove(&previous, &self.conn_id);
        }
        self.state.registry.add(&user_id, self.sender.clone());
        self.registered_user = Some(user_id);
    }

    fn start_turn(&mut self, input: TurnInput) {
        // turn_guard has passed, so chat_id is bound
        let Some(chat_id) = self.conn.chat_id.clone() else {
            return;
        };
        self.conn.begin_turn();

        let pipeline = self.state.turn_pipeline();
        let user_id = self.conn.identity.user_id.clone();
        let sender = self.sender.clone();
        let done_tx = self.done_tx.clone();

        self.turn_task = Some(tokio::spawn(async move {
            pipeline.run(&user_id, &chat_id, input, &sender).await;
            let _ = done_tx.send(()).await;
        }));
    }

    async fn on_turn_done(&mut self) {
        self.conn.complete_turn();
        self.turn_task = None;

        // Apply control frames that arrived mid-turn, in order. None of
        // them initiate turns, so this cannot re-enter Processing.
        while let Some(frame) = self.pending.pop_front() {
            let _ = self.apply_control(frame).await;
        }
    }

    fn reply(&self, frame: ServerFrame) -> Flow {
        match self.sender.send(&frame) {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_frame() -> ClientFrame {
        ClientFrame::TextMessage {
            text: "hello".to_string(),
        }
    }

    #[test]
    fn test_initial_state() {
        let conn = ConnState::new(None);
        assert!(!conn.authenticated);
        assert!(conn.identity.is_anonymous());
        assert_eq!(conn.turn, TurnState::Idle);

        let conn = ConnState::new(Some(Identity::new("u1", Role::User)));
        assert!(conn.authenticated);
        assert_eq!(conn.identity.user_id, "u1");
    }

    #[test]
    fn test_turn_guard() {
        let mut conn = ConnState::new(None);
        assert_eq!(conn.turn_guard(true), Err("Authentication required"));
        assert_eq!(conn.turn_guard(false), Err("No active chat session"));

        conn.chat_id = Some("S1".to_string());
        assert_eq!(conn.turn_guard(false), Ok(()));
        assert_eq!(conn.turn_guard(true), Err("Authentication required"));

        conn.authenticated = true;
        assert_eq!(conn.turn_guard(true), Ok(()));
    }

    #[test]
    fn test_start_stream_is_advisory() {
        let mut conn = ConnState::new(None);
        conn.on_start_stream();
        assert_eq!(conn.turn, TurnState::AwaitingAudio);

        // No-op when already waiting or processing
        conn.on_start_stream();
        assert_eq!(conn.turn, TurnState::AwaitingAudio);
        conn.begin_turn();
        conn.on_start_stream();
        assert_eq!(conn.turn, TurnState::Processing);
    }

    #[test]
    fn test_turn_completion_returns_to_idle() {
        let mut conn = ConnState::new(None);
        conn.begin_turn();
        assert_eq!(conn.turn, TurnState::Processing);
        conn.complete_turn();
        assert_eq!(conn.turn, TurnState::Idle);

        // Completion after close keeps the terminal state
        conn.turn = TurnState::Closed;
        conn.complete_turn();
        assert_eq!(conn.turn, TurnState::Closed);
    }

    #[test]
    fn test_inbound_action_when_idle() {
        assert_eq!(
            inbound_action(TurnState::Idle, &text_frame(), 0, 32),
            InboundAction::Handle
        );
        assert_eq!(
            inbound_action(TurnState::AwaitingAudio, &ClientFrame::EndStream, 0, 32),
            InboundAction::Handle
        );
    }

    #[test]
    fn test_busy_rejects_new_turns() {
        assert_eq!(
            inbound_action(TurnState::Processing, &text_frame(), 0, 32),
            InboundAction::RejectBusy
        );
    }

    #[test]
    fn test_control_frames_buffer_during_turn() {
        let frame = ClientFrame::SetChatId {
            chat_id: "S2".to_string(),
        };
        assert_eq!(
            inbound_action(TurnState::Processing, &frame, 0, 32),
            InboundAction::Buffer
        );
        // Bounded buffer: overflow rejects
        assert_eq!(
            inbound_action(TurnState::Processing, &frame, 32, 32),
            InboundAction::RejectBusy
        );
    }
}
