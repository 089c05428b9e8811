//! Match modules: simulation, players and rooms

pub mod action;
pub mod engine;
pub mod outcome;
pub mod physics;
pub mod player;
pub mod room;
pub mod session;
pub mod snapshot;

pub use outcome::{GameResult, MatchRecord};
pub use room::{Room, RoomConfig, RoomPhase};
pub use session::Session;
