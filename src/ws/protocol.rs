//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message sent from client to server: the pressed keys as a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMsg {
    pub action: u32,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Placed in a room, waiting for an opponent
    Connected,

    /// Rejected: this user already plays in another room
    Playing,

    /// Second player arrived, the match is running
    Started(StartedInfo),

    /// Game state snapshot (sent every frame)
    State(StateSnapshot),

    /// Match timer elapsed
    TimeOver,

    /// Opponent left the match
    Disconnected,
}

impl ServerMsg {
    /// Status tag as it appears on the wire
    pub fn status(&self) -> &'static str {
        match self {
            ServerMsg::Connected => "connected",
            ServerMsg::Playing => "playing",
            ServerMsg::Started(_) => "started",
            ServerMsg::State(_) => "state",
            ServerMsg::TimeOver => "time_over",
            ServerMsg::Disconnected => "disconnected",
        }
    }
}

/// Payload of `started`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedInfo {
    /// User id of the other player
    pub opponent: Uuid,
    /// 1 or 2
    #[serde(rename = "playerNum")]
    pub player_num: u8,
    /// Match length in seconds
    pub duration: u64,
}

/// Full game state as broadcast every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub player1: PlayerSnapshot,
    pub player2: PlayerSnapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<ProductSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collected: Vec<PointsSnapshot>,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub score: i32,
    /// 0-100
    #[serde(rename = "X")]
    pub x: f64,
    /// 0-100
    #[serde(rename = "Y")]
    pub y: f64,
    /// Product types still to catch
    #[serde(rename = "targetList")]
    pub target_list: Vec<u8>,
}

/// Falling product in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// Points shown where a product was caught
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsSnapshot {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "playerNum")]
    pub player_num: u8,
    pub points: i32,
}
