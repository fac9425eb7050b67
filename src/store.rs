//! Read seam to the persistence layer.
//!
//! The pipeline only ever reads history through [`HistorySource`]; Postgres is
//! one implementation (`db::PgStore`). Test builds add an in-memory
//! `MemoryStore` for the pipeline tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Board, PostingEvent, PostingObservation, ScoreSnapshot, SurveyAggregate};

#[cfg(test)]
pub use memory::MemoryStore;

/// Everything the engine consumes about a board's accumulated history.
///
/// Implementations must be `Send + Sync`; one call per board may run
/// concurrently with calls for other boards.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn boards(&self) -> EngineResult<Vec<Board>>;

    /// Observations for one board, ordered by `first_seen`.
    async fn observations(&self, board_id: Uuid) -> EngineResult<Vec<PostingObservation>>;

    /// Lifecycle events for every posting on one board, ordered by date.
    async fn events(&self, board_id: Uuid) -> EngineResult<Vec<PostingEvent>>;

    /// Survey responses received up to `as_of`.
    async fn survey(&self, board_id: Uuid, as_of: DateTime<Utc>) -> EngineResult<SurveyAggregate>;

    /// Prior snapshots, oldest first.
    async fn snapshots(&self, board_id: Uuid) -> EngineResult<Vec<ScoreSnapshot>>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::EventType;
    use chrono::{TimeZone, Utc};

    fn board(name: &str) -> Board {
        Board {
            id: Uuid::new_v4(),
            name: name.to_string(),
            industry: None,
        }
    }

    #[tokio::test]
    async fn reads_are_scoped_to_board() {
        let store = MemoryStore::new();
        let alpha = board("Alpha");
        let beta = board("Beta");
        store.add_board(beta.clone()).await;
        store.add_board(alpha.clone()).await;

        let posting = |board_id: Uuid, day: u32| PostingObservation {
            posting_id: Uuid::new_v4(),
            board_id,
            title: "Data Analyst".to_string(),
            company: "Acme".to_string(),
            url: String::new(),
            role_family: String::new(),
            first_seen: Utc.with_ymd_and_hms(2026, 2, day, 0, 0, 0).unwrap(),
        };
        let late = posting(alpha.id, 20);
        let early = posting(alpha.id, 3);
        store
            .add_observations(vec![late.clone(), early.clone(), posting(beta.id, 5)])
            .await;
        store
            .add_events(vec![PostingEvent {
                posting_id: early.posting_id,
                event_type: EventType::Appeared,
                event_date: early.first_seen,
                notes: None,
            }])
            .await;

        let names: Vec<String> = store.boards().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);

        let observations = store.observations(alpha.id).await.unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].posting_id, early.posting_id);
        assert_eq!(store.events(alpha.id).await.unwrap().len(), 1);
        assert!(store.events(beta.id).await.unwrap().is_empty());
        assert_eq!(store.survey(beta.id, Utc::now()).await.unwrap().employer_score, None);
    }

    #[tokio::test]
    async fn unavailable_board_fails_reads() {
        let store = MemoryStore::new();
        let flaky = board("Flaky");
        store.add_board(flaky.clone()).await;
        store.mark_unavailable(flaky.id).await;

        let err = store.observations(flaky.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Source { ref board, .. } if board == "Flaky"));
        assert_eq!(store.boards().await.unwrap().len(), 1);
    }
}
