use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingObservation {
    pub posting_id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub company: String,
    pub url: String,
    pub role_family: String,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Appeared,
    Reappeared,
    Disappeared,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Appeared => "appeared",
            EventType::Reappeared => "reappeared",
            EventType::Disappeared => "disappeared",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "appeared" => Ok(EventType::Appeared),
            "reappeared" => Ok(EventType::Reappeared),
            "disappeared" => Ok(EventType::Disappeared),
            other => Err(EngineError::InvalidInput(format!(
                "unknown posting event type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingEvent {
    pub posting_id: Uuid,
    pub event_type: EventType,
    pub event_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Satisfaction scores aggregated from the survey tables, already on a 0-100 scale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyAggregate {
    pub employer_score: Option<f64>,
    pub employer_responses: i64,
    pub candidate_score: Option<f64>,
    pub candidate_responses: i64,
    /// Responses received in the seven days up to the run.
    #[serde(default)]
    pub employer_responses_week: i64,
    #[serde(default)]
    pub candidate_responses_week: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub board_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub overall_score: Option<f64>,
    pub avg_lifespan: Option<f64>,
    pub repost_rate: f64,
    pub new_postings: i64,
    pub total_postings: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub day: NaiveDate,
    pub new_postings: i64,
}
