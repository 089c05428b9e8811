//! Player actor: one inbound and one outbound loop per connection

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::session::{send_frame, ConnectionError, Frame, FrameSink, FrameStream, Session};

/// Outbound queue size per player
pub const OUTBOUND_QUEUE_SIZE: usize = 100;

/// Action received from a player, addressed by match-scoped id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerAction {
    pub game_session_id: Uuid,
    pub action: u32,
}

/// Commands for the outbound loop
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMsg),
    /// Write a normal-closure frame and stop
    Close,
}

/// Channels tying an actor to its room
#[derive(Clone)]
pub struct RoomLink {
    pub room_id: Uuid,
    pub actions: mpsc::Sender<PlayerAction>,
    pub departures: mpsc::Sender<Uuid>,
    pub cancel: watch::Receiver<bool>,
}

impl RoomLink {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn report_departure(&self, game_session_id: Uuid) {
        if self.departures.send(game_session_id).await.is_err() {
            debug!(room_id = %self.room_id, game_session_id = %game_session_id, "Room already gone");
        }
    }
}

/// Resolves once the room fired its cancellation signal (or was dropped)
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// A player inside a room
pub struct Player {
    pub user_id: Uuid,
    /// Match-scoped id, unique within the room
    pub game_session_id: Uuid,
    outbound: mpsc::Sender<Outbound>,
    /// Read half, parked until the match starts
    stream: Mutex<Option<FrameStream>>,
    link: RoomLink,
}

impl Player {
    /// Wrap a session and start its outbound loop right away
    pub fn spawn(session: Session, link: RoomLink, write_timeout: Duration) -> Self {
        let game_session_id = Uuid::new_v4();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);

        tokio::spawn(send_loop(
            game_session_id,
            session.user_id,
            session.sink,
            outbound_rx,
            link.clone(),
            write_timeout,
        ));

        Self {
            user_id: session.user_id,
            game_session_id,
            outbound,
            stream: Mutex::new(Some(session.stream)),
            link,
        }
    }

    /// Start the inbound loop. Only the first call has an effect.
    pub fn start_listening(&self) {
        let Some(stream) = self.stream.lock().take() else {
            warn!(game_session_id = %self.game_session_id, "Player is already listening");
            return;
        };

        tokio::spawn(listen_loop(
            self.game_session_id,
            self.user_id,
            stream,
            self.link.clone(),
            PlayerRateLimiter::new(),
        ));
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn send(&self, msg: ServerMsg) -> bool {
        self.enqueue(Outbound::Message(msg))
    }

    /// Ask the outbound loop to close the connection
    pub fn close(&self) -> bool {
        self.enqueue(Outbound::Close)
    }

    fn enqueue(&self, command: Outbound) -> bool {
        match self.outbound.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    room_id = %self.link.room_id,
                    game_session_id = %self.game_session_id,
                    "Outbound queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(game_session_id = %self.game_session_id, "Outbound loop already stopped");
                false
            }
        }
    }
}

/// Inbound loop: connection -> room action queue
async fn listen_loop(
    game_session_id: Uuid,
    user_id: Uuid,
    mut stream: FrameStream,
    link: RoomLink,
    rate_limiter: PlayerRateLimiter,
) {
    let mut cancel = link.cancel.clone();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                debug!(room_id = %link.room_id, game_session_id = %game_session_id, "Stopped listening to player");
                return;
            }
            next = stream.next() => next,
        };

        let failure = match next {
            Some(Ok(Frame::Text(text))) => {
                if !rate_limiter.check_action() {
                    warn!(game_session_id = %game_session_id, "Rate limited action message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        let action = PlayerAction {
                            game_session_id,
                            action: msg.action,
                        };
                        if link.actions.send(action).await.is_err() {
                            debug!(game_session_id = %game_session_id, "Action queue closed");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(game_session_id = %game_session_id, error = %e, "Failed to parse client message");
                    }
                }
                continue;
            }
            Some(Ok(Frame::Close)) | None => ConnectionError::Closed,
            Some(Err(e)) => e,
        };

        if link.is_cancelled() {
            debug!(game_session_id = %game_session_id, "Read ended during shutdown");
            return;
        }

        match failure {
            ConnectionError::Closed => {
                info!(user_id = %user_id, game_session_id = %game_session_id, "Player was disconnected");
            }
            e => {
                error!(user_id = %user_id, game_session_id = %game_session_id, error = %e, "Read failed");
            }
        }
        link.report_departure(game_session_id).await;
        return;
    }
}

/// Outbound loop: queue -> connection
async fn send_loop(
    game_session_id: Uuid,
    user_id: Uuid,
    mut sink: FrameSink,
    mut queue: mpsc::Receiver<Outbound>,
    link: RoomLink,
    write_timeout: Duration,
) {
    let mut cancel = link.cancel.clone();

    loop {
        let command = tokio::select! {
            biased;
            command = queue.recv() => command,
            _ = cancelled(&mut cancel) => {
                debug!(room_id = %link.room_id, game_session_id = %game_session_id, "Stopped sending to player");
                return;
            }
        };

        match command {
            Some(Outbound::Message(msg)) => {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(game_session_id = %game_session_id, error = %e, "Failed to encode message");
                        continue;
                    }
                };

                if let Err(e) = send_frame(&mut sink, Frame::Text(text), write_timeout).await {
                    info!(
                        user_id = %user_id,
                        game_session_id = %game_session_id,
                        status = msg.status(),
                        error = %e,
                        "Player was disconnected"
                    );
                    link.report_departure(game_session_id).await;
                    return;
                }
            }
            Some(Outbound::Close) => {
                if let Err(e) = send_frame(&mut sink, Frame::Close, write_timeout).await {
                    debug!(game_session_id = %game_session_id, error = %e, "Close frame not delivered");
                }
                let _ = tokio::time::timeout(write_timeout, sink.close()).await;
                info!(room_id = %link.room_id, user_id = %user_id, game_session_id = %game_session_id, "Server disconnected player");
                return;
            }
            // Player dropped by its room
            None => return,
        }
    }
}
