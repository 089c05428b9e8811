//! Authenticated connection handed over by the WebSocket intake
//!
//! The transport is reduced to a sink and a stream of [`Frame`]s so the match
//! code does not depend on axum types and can be driven in memory.

use futures::{Sink, SinkExt, Stream};
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// One message on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Normal closure
    Close,
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("write deadline of {0:?} exceeded")]
    Timeout(Duration),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ConnectionError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, ConnectionError>> + Send>>;

/// A validated player connection
pub struct Session {
    /// Persistent user identity
    pub user_id: Uuid,
    /// Auth session the connection was opened with
    pub session_id: String,
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Session {
    pub fn new<S, R>(user_id: Uuid, session_id: String, sink: S, stream: R) -> Self
    where
        S: Sink<Frame, Error = ConnectionError> + Send + 'static,
        R: Stream<Item = Result<Frame, ConnectionError>> + Send + 'static,
    {
        Self {
            user_id,
            session_id,
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Write one frame, giving up after `deadline`
pub async fn send_frame(
    sink: &mut FrameSink,
    frame: Frame,
    deadline: Duration,
) -> Result<(), ConnectionError> {
    tokio::time::timeout(deadline, sink.send(frame))
        .await
        .map_err(|_| ConnectionError::Timeout(deadline))?
}
