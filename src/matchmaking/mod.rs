//! Matchmaking: room placement and reclaim

pub mod service;

pub use service::MatchmakingService;
