use std::cmp::Ordering;

use serde::Serialize;
use uuid::Uuid;

use crate::bands::{self, Grade, RepostSeverity};
use crate::models::SurveyAggregate;
use crate::stats::{percentage, percentile_rank, round_to};

pub const LIFESPAN_WEIGHT: f64 = 0.40;
pub const REPOST_WEIGHT: f64 = 0.30;
pub const EMPLOYER_WEIGHT: f64 = 0.20;
pub const CANDIDATE_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct ScoreInputs {
    pub board_id: Uuid,
    pub board_name: String,
    pub total_postings: usize,
    pub avg_lifespan_days: Option<f64>,
    pub repost_rate: f64,
    pub survey: SurveyAggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub weight: f64,
    pub score: f64,
    pub contribution: f64,
}

impl ScoreComponent {
    fn new(weight: f64, score: f64) -> Self {
        Self {
            weight,
            score,
            contribution: score * weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub lifespan: ScoreComponent,
    pub repost: ScoreComponent,
    pub employer_survey: ScoreComponent,
    pub candidate_survey: ScoreComponent,
}

impl ScoreComponents {
    pub fn weighted_total(&self) -> f64 {
        self.lifespan.contribution
            + self.repost.contribution
            + self.employer_survey.contribution
            + self.candidate_survey.contribution
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressionReason {
    UnreliableData { repost_rate: f64 },
    NoPostings,
}

impl SuppressionReason {
    pub fn describe(&self) -> String {
        match self {
            SuppressionReason::UnreliableData { repost_rate } => {
                format!("data unreliable: repost rate {repost_rate:.1}% exceeds 50%")
            }
            SuppressionReason::NoPostings => "no postings observed yet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EfficiencyScore {
    pub board_id: Uuid,
    pub board_name: String,
    pub overall_score: Option<u32>,
    pub grade: Option<Grade>,
    pub components: ScoreComponents,
    pub quality_adjustment: f64,
    pub repost_rate: f64,
    pub severity: RepostSeverity,
    pub data_completeness: f64,
    pub suppression: Option<SuppressionReason>,
    pub rank: Option<usize>,
    pub percentile: Option<f64>,
}

impl EfficiencyScore {
    pub fn is_scored(&self) -> bool {
        self.overall_score.is_some()
    }
}

pub fn lifespan_score(avg_lifespan_days: f64) -> f64 {
    (100.0 - avg_lifespan_days * 1.5).clamp(0.0, 100.0)
}

pub fn repost_score(repost_rate: f64) -> f64 {
    (100.0 - repost_rate * 10.0).clamp(0.0, 100.0)
}

fn data_completeness(inputs: &ScoreInputs) -> f64 {
    let present = [
        inputs.avg_lifespan_days.is_some(),
        inputs.total_postings > 0,
        inputs.survey.employer_score.is_some(),
        inputs.survey.candidate_score.is_some(),
    ];
    present.iter().filter(|p| **p).count() as f64 / present.len() as f64
}

pub fn score_board(inputs: &ScoreInputs) -> EfficiencyScore {
    let components = ScoreComponents {
        lifespan: ScoreComponent::new(
            LIFESPAN_WEIGHT,
            inputs.avg_lifespan_days.map(lifespan_score).unwrap_or(0.0),
        ),
        repost: ScoreComponent::new(REPOST_WEIGHT, repost_score(inputs.repost_rate)),
        employer_survey: ScoreComponent::new(
            EMPLOYER_WEIGHT,
            inputs.survey.employer_score.unwrap_or(0.0).clamp(0.0, 100.0),
        ),
        candidate_survey: ScoreComponent::new(
            CANDIDATE_WEIGHT,
            inputs.survey.candidate_score.unwrap_or(0.0).clamp(0.0, 100.0),
        ),
    };

    let band = bands::quality_band(inputs.repost_rate);
    let suppression = if inputs.total_postings == 0 {
        Some(SuppressionReason::NoPostings)
    } else if band.multiplier == 0.0 {
        Some(SuppressionReason::UnreliableData {
            repost_rate: inputs.repost_rate,
        })
    } else {
        None
    };

    let overall_score = match suppression {
        Some(_) => None,
        None => Some((components.weighted_total() * band.multiplier).round().clamp(0.0, 100.0) as u32),
    };

    EfficiencyScore {
        board_id: inputs.board_id,
        board_name: inputs.board_name.clone(),
        overall_score,
        grade: overall_score.map(|s| Grade::for_score(s as f64)),
        components,
        quality_adjustment: band.multiplier,
        repost_rate: inputs.repost_rate,
        severity: band.severity,
        data_completeness: data_completeness(inputs),
        suppression,
        rank: None,
        percentile: None,
    }
}

/// Orders by score descending (name breaks ties); suppressed boards go last,
/// unranked.
pub fn rank_scores(scores: &mut [EfficiencyScore]) {
    scores.sort_by(|a, b| match (a.overall_score, b.overall_score) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.board_name.cmp(&b.board_name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.board_name.cmp(&b.board_name),
    });

    // Equal scores share a percentile even though the name orders their rank.
    let population: Vec<f64> = scores
        .iter()
        .filter_map(|s| s.overall_score.map(f64::from))
        .collect();
    for (index, score) in scores.iter_mut().enumerate() {
        if let Some(value) = score.overall_score {
            score.rank = Some(index + 1);
            score.percentile = Some(round_to(percentile_rank(&population, f64::from(value)), 1));
        } else {
            score.rank = None;
            score.percentile = None;
        }
    }
}

pub fn top_performers(scores: &[EfficiencyScore], limit: usize) -> Vec<&EfficiencyScore> {
    let mut scored: Vec<&EfficiencyScore> = scores.iter().filter(|s| s.is_scored()).collect();
    scored.sort_by(|a, b| {
        b.overall_score
            .cmp(&a.overall_score)
            .then_with(|| a.board_name.cmp(&b.board_name))
    });
    scored.truncate(limit);
    scored
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBucket {
    pub range: &'static str,
    pub min: u32,
    pub max: u32,
    pub count: usize,
    pub percentage: f64,
}

const SCORE_BUCKETS: [(&str, u32, u32); 6] = [
    ("0-19", 0, 19),
    ("20-39", 20, 39),
    ("40-59", 40, 59),
    ("60-79", 60, 79),
    ("80-89", 80, 89),
    ("90-100", 90, 100),
];

pub fn score_distribution(scores: &[EfficiencyScore]) -> Vec<ScoreBucket> {
    let values: Vec<u32> = scores.iter().filter_map(|s| s.overall_score).collect();
    SCORE_BUCKETS
        .iter()
        .map(|(range, min, max)| {
            let count = values.iter().filter(|v| **v >= *min && **v <= *max).count();
            ScoreBucket {
                range: *range,
                min: *min,
                max: *max,
                count,
                percentage: round_to(percentage(count, values.len()), 1),
            }
        })
        .collect()
}
