//! Player profile statistics

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::game::{GameResult, MatchRecord};

use super::reporter::{ReportError, ResultReporter};
use super::supabase::{SupabaseClient, SupabaseError};

/// Stored procedure updating the counters and the best score in one statement
const RECORD_MATCH_RESULT: &str = "record_match_result";

/// Arguments of `record_match_result`
#[derive(Debug, Clone, Serialize)]
struct RecordMatchArgs {
    p_user_id: Uuid,
    p_score: i32,
    p_result: GameResult,
}

impl From<&MatchRecord> for RecordMatchArgs {
    fn from(record: &MatchRecord) -> Self {
        Self {
            p_user_id: record.user_id,
            p_score: record.score,
            p_result: record.result,
        }
    }
}

/// Profile store operations
#[derive(Clone)]
pub struct ProfileStore {
    client: SupabaseClient,
}

impl ProfileStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Count the result and raise the record if the score beats it
    pub async fn record_result(&self, record: &MatchRecord) -> Result<(), SupabaseError> {
        self.client
            .rpc(RECORD_MATCH_RESULT, &RecordMatchArgs::from(record))
            .await?;
        debug!(user_id = %record.user_id, score = record.score, result = ?record.result, "Match result stored");
        Ok(())
    }
}

#[async_trait]
impl ResultReporter for ProfileStore {
    async fn report(&self, record: &MatchRecord) -> Result<(), ReportError> {
        self.record_result(record).await.map_err(ReportError::from)
    }
}
