//! Application state shared across routes

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::matchmaking::MatchmakingService;
use crate::store::{LogReporter, ProfileStore, ResultReporter, SupabaseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Results go to Supabase when configured
        let reporter: Arc<dyn ResultReporter> = match &config.supabase {
            Some(supabase) => {
                info!(url = %supabase.url, "Match results are stored in Supabase");
                Arc::new(ProfileStore::new(SupabaseClient::new(supabase)))
            }
            None => {
                warn!("Supabase is not configured, match results are only logged");
                Arc::new(LogReporter)
            }
        };

        // Initialize matchmaking service (Arc for sharing across cloned AppState)
        let matchmaking = Arc::new(MatchmakingService::new(
            config.max_rooms,
            config.room,
            reporter,
        ));

        Self {
            config,
            matchmaking,
        }
    }
}
