//! Destination of finished match results

use async_trait::async_trait;
use tracing::info;

use crate::game::MatchRecord;

use super::supabase::SupabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("profile store: {0}")]
    Store(#[from] SupabaseError),
}

/// Receives one record per participant of every finished match
#[async_trait]
pub trait ResultReporter: Send + Sync {
    async fn report(&self, record: &MatchRecord) -> Result<(), ReportError>;
}

/// Reporter used when no profile store is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl ResultReporter for LogReporter {
    async fn report(&self, record: &MatchRecord) -> Result<(), ReportError> {
        info!(
            user_id = %record.user_id,
            score = record.score,
            result = ?record.result,
            "Match result (not persisted)"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps every reported record
    #[derive(Default)]
    pub struct RecordingReporter {
        records: Mutex<Vec<MatchRecord>>,
    }

    impl RecordingReporter {
        pub fn records(&self) -> Vec<MatchRecord> {
            self.records.lock().clone()
        }
    }

    #[async_trait]
    impl ResultReporter for RecordingReporter {
        async fn report(&self, record: &MatchRecord) -> Result<(), ReportError> {
            self.records.lock().push(*record);
            Ok(())
        }
    }
}
