//! Weekly digest: leading and trailing boards, week-over-week movers, survey
//! volume and a handful of headline insights.

use std::cmp::Ordering;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Board, ScoreSnapshot, SurveyAggregate};
use crate::scoring::EfficiencyScore;
use crate::stats::round_to;

const LIST_LIMIT: usize = 5;
const STEADY_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Movement {
    Rising,
    Declining,
    Steady,
}

impl Movement {
    fn for_change(change: f64, threshold: f64) -> Self {
        if change > threshold {
            Movement::Rising
        } else if change < -threshold {
            Movement::Declining
        } else {
            Movement::Steady
        }
    }
}

/// One scored board compared with where it stood a week earlier.
#[derive(Debug, Clone, Serialize)]
pub struct BoardMovement {
    pub board_id: Uuid,
    pub board_name: String,
    pub current_score: u32,
    /// Latest scored snapshot at least seven days old, if any.
    pub previous_score: Option<f64>,
    pub score_change: f64,
    pub percent_change: f64,
    pub movement: Movement,
    pub employer_score: Option<f64>,
    pub employer_responses: i64,
    pub candidate_score: Option<f64>,
    pub candidate_responses: i64,
}

/// `None` for an unscored board. Without a week-old snapshot the board is
/// steady with no change.
pub fn board_movement(
    board: &Board,
    score: &EfficiencyScore,
    history: &[ScoreSnapshot],
    survey: &SurveyAggregate,
    as_of: NaiveDate,
    threshold: f64,
) -> Option<BoardMovement> {
    let current = score.overall_score?;
    let week_ago = as_of - Duration::days(7);
    let previous_score = history
        .iter()
        .filter(|s| s.snapshot_date <= week_ago)
        .filter_map(|s| s.overall_score.map(|value| (s.snapshot_date, value)))
        .max_by_key(|(date, _)| *date)
        .map(|(_, value)| value);

    let score_change = previous_score.map_or(0.0, |previous| f64::from(current) - previous);
    let percent_change = match previous_score {
        Some(previous) if previous > 0.0 => score_change / previous * 100.0,
        _ => 0.0,
    };

    Some(BoardMovement {
        board_id: board.id,
        board_name: board.name.clone(),
        current_score: current,
        previous_score,
        score_change: round_to(score_change, 1),
        percent_change: round_to(percent_change, 1),
        movement: Movement::for_change(score_change, threshold),
        employer_score: survey.employer_score,
        employer_responses: survey.employer_responses,
        candidate_score: survey.candidate_score,
        candidate_responses: survey.candidate_responses,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SurveyVolume {
    pub total_employer: i64,
    pub total_candidate: i64,
    pub weekly_employer: i64,
    pub weekly_candidate: i64,
}

impl SurveyVolume {
    pub fn tally<'a>(surveys: impl IntoIterator<Item = &'a SurveyAggregate>) -> Self {
        surveys.into_iter().fold(Self::default(), |mut volume, survey| {
            volume.total_employer += survey.employer_responses;
            volume.total_candidate += survey.candidate_responses;
            volume.weekly_employer += survey.employer_responses_week;
            volume.weekly_candidate += survey.candidate_responses_week;
            volume
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub title: String,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyInsights {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub top_boards: Vec<BoardMovement>,
    /// Lowest score first.
    pub bottom_boards: Vec<BoardMovement>,
    pub rising_boards: Vec<BoardMovement>,
    pub declining_boards: Vec<BoardMovement>,
    pub steady_boards: Vec<BoardMovement>,
    pub survey_volume: SurveyVolume,
    pub insights: Vec<Insight>,
}

fn by_score_desc(a: &BoardMovement, b: &BoardMovement) -> Ordering {
    b.current_score
        .cmp(&a.current_score)
        .then_with(|| a.board_name.cmp(&b.board_name))
}

fn rating(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |s| format!("{s:.0}/100"))
}

fn headline_insights(
    best: Option<&BoardMovement>,
    rising: Option<&BoardMovement>,
    declining: Option<&BoardMovement>,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(board) = rising {
        insights.push(Insight {
            title: format!("{} is rising fast", board.board_name),
            description: format!(
                "{} gained {:.1} points this week ({:+.1}%), backed by {} employer and {} candidate survey responses.",
                board.board_name,
                board.score_change,
                board.percent_change,
                board.employer_responses,
                board.candidate_responses
            ),
            recommendation: format!(
                "Feature {} more prominently in recommendations.",
                board.board_name
            ),
        });
    }

    if let Some(board) = declining {
        insights.push(Insight {
            title: format!("{} needs attention", board.board_name),
            description: format!(
                "{} lost {:.1} points this week ({:+.1}%). Review recent survey feedback to see what changed.",
                board.board_name,
                board.score_change.abs(),
                board.percent_change
            ),
            recommendation: format!(
                "Contact {} or investigate candidate feedback for issues.",
                board.board_name
            ),
        });
    }

    if let Some(board) = best {
        insights.push(Insight {
            title: format!("Best overall: {}", board.board_name),
            description: format!(
                "{} leads with a {}/100 score. Employers rate it {} and candidates {}.",
                board.board_name,
                board.current_score,
                rating(board.employer_score),
                rating(board.candidate_score)
            ),
            recommendation: "This is the top recommendation for job seekers.".to_string(),
        });
    }

    insights
}

pub fn weekly_insights(
    movements: &[BoardMovement],
    survey_volume: SurveyVolume,
    as_of: NaiveDate,
) -> WeeklyInsights {
    let mut ranked = movements.to_vec();
    ranked.sort_by(by_score_desc);

    let mut rising: Vec<BoardMovement> = ranked
        .iter()
        .filter(|m| m.movement == Movement::Rising)
        .cloned()
        .collect();
    rising.sort_by(|a, b| {
        b.score_change
            .total_cmp(&a.score_change)
            .then_with(|| a.board_name.cmp(&b.board_name))
    });
    rising.truncate(LIST_LIMIT);

    let mut declining: Vec<BoardMovement> = ranked
        .iter()
        .filter(|m| m.movement == Movement::Declining)
        .cloned()
        .collect();
    declining.sort_by(|a, b| {
        a.score_change
            .total_cmp(&b.score_change)
            .then_with(|| a.board_name.cmp(&b.board_name))
    });
    declining.truncate(LIST_LIMIT);

    let steady: Vec<BoardMovement> = ranked
        .iter()
        .filter(|m| m.movement == Movement::Steady)
        .take(STEADY_LIMIT)
        .cloned()
        .collect();

    let insights = headline_insights(ranked.first(), rising.first(), declining.first());

    WeeklyInsights {
        period_start: as_of - Duration::days(7),
        period_end: as_of,
        top_boards: ranked.iter().take(LIST_LIMIT).cloned().collect(),
        bottom_boards: ranked.iter().rev().take(LIST_LIMIT).cloned().collect(),
        rising_boards: rising,
        declining_boards: declining,
        steady_boards: steady,
        survey_volume,
        insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{score_board, ScoreInputs};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
    }

    fn movement(name: &str, current: u32, change: f64) -> BoardMovement {
        BoardMovement {
            board_id: Uuid::new_v4(),
            board_name: name.to_string(),
            current_score: current,
            previous_score: Some(f64::from(current) - change),
            score_change: change,
            percent_change: 0.0,
            movement: Movement::for_change(change, 5.0),
            employer_score: Some(80.0),
            employer_responses: 4,
            candidate_score: None,
            candidate_responses: 0,
        }
    }

    fn scored(name: &str) -> (Board, EfficiencyScore) {
        let board = Board {
            id: Uuid::new_v4(),
            name: name.to_string(),
            industry: None,
        };
        let score = score_board(&ScoreInputs {
            board_id: board.id,
            board_name: board.name.clone(),
            total_postings: 10,
            avg_lifespan_days: Some(10.0),
            repost_rate: 0.0,
            survey: SurveyAggregate {
                employer_score: Some(80.0),
                employer_responses: 4,
                candidate_score: Some(70.0),
                candidate_responses: 3,
                ..SurveyAggregate::default()
            },
        });
        (board, score)
    }

    fn snapshot(board: &Board, day: u32, score: Option<f64>) -> ScoreSnapshot {
        ScoreSnapshot {
            board_id: board.id,
            snapshot_date: date(day),
            overall_score: score,
            avg_lifespan: None,
            repost_rate: 0.0,
            new_postings: 0,
            total_postings: 0,
        }
    }

    #[test]
    fn compares_against_latest_week_old_snapshot() {
        let (board, score) = scored("Alpha");
        assert_eq!(score.overall_score, Some(87));
        let history = vec![
            snapshot(&board, 1, Some(70.0)),
            snapshot(&board, 8, Some(75.0)),
            snapshot(&board, 10, None),
            snapshot(&board, 12, Some(99.0)),
        ];

        let moved = board_movement(&board, &score, &history, &SurveyAggregate::default(), date(15), 5.0).unwrap();
        assert_eq!(moved.previous_score, Some(75.0));
        assert_eq!(moved.score_change, 12.0);
        assert_eq!(moved.percent_change, 16.0);
        assert_eq!(moved.movement, Movement::Rising);
    }

    #[test]
    fn no_week_old_snapshot_is_steady() {
        let (board, score) = scored("Alpha");
        let history = vec![snapshot(&board, 12, Some(20.0))];
        let moved = board_movement(&board, &score, &history, &SurveyAggregate::default(), date(15), 5.0).unwrap();
        assert_eq!(moved.previous_score, None);
        assert_eq!(moved.score_change, 0.0);
        assert_eq!(moved.movement, Movement::Steady);
    }

    #[test]
    fn small_changes_stay_steady() {
        let (board, score) = scored("Alpha");
        let history = vec![snapshot(&board, 1, Some(83.0))];
        let moved = board_movement(&board, &score, &history, &SurveyAggregate::default(), date(15), 5.0).unwrap();
        assert_eq!(moved.score_change, 4.0);
        assert_eq!(moved.movement, Movement::Steady);
    }

    #[test]
    fn unscored_board_has_no_movement() {
        let (board, mut score) = scored("Alpha");
        score.overall_score = None;
        assert!(board_movement(&board, &score, &[], &SurveyAggregate::default(), date(15), 5.0).is_none());
    }

    #[test]
    fn digest_orders_leaders_and_movers() {
        let movements = vec![
            movement("Climber", 70, 8.0),
            movement("Leader", 92, 1.0),
            movement("Rocket", 65, 20.0),
            movement("Sinker", 40, -12.0),
            movement("Slider", 55, -6.0),
        ];
        let volume = SurveyVolume {
            total_employer: 20,
            total_candidate: 9,
            weekly_employer: 3,
            weekly_candidate: 1,
        };

        let digest = weekly_insights(&movements, volume, date(15));
        let names = |list: &[BoardMovement]| list.iter().map(|m| m.board_name.clone()).collect::<Vec<_>>();

        assert_eq!(digest.period_start, date(8));
        assert_eq!(names(&digest.top_boards), vec!["Leader", "Climber", "Rocket", "Slider", "Sinker"]);
        assert_eq!(names(&digest.bottom_boards), vec!["Sinker", "Slider", "Rocket", "Climber", "Leader"]);
        assert_eq!(names(&digest.rising_boards), vec!["Rocket", "Climber"]);
        assert_eq!(names(&digest.declining_boards), vec!["Sinker", "Slider"]);
        assert_eq!(names(&digest.steady_boards), vec!["Leader"]);
        assert_eq!(digest.survey_volume.weekly_employer, 3);

        let titles: Vec<&str> = digest.insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Rocket is rising fast", "Sinker needs attention", "Best overall: Leader"]
        );
        assert!(digest.insights[2].description.contains("Employers rate it 80/100 and candidates n/a"));
    }

    #[test]
    fn empty_week_has_no_insights() {
        let digest = weekly_insights(&[], SurveyVolume::default(), date(15));
        assert!(digest.top_boards.is_empty());
        assert!(digest.insights.is_empty());
    }

    #[test]
    fn survey_volume_sums_boards() {
        let a = SurveyAggregate {
            employer_responses: 4,
            employer_responses_week: 1,
            candidate_responses: 2,
            ..SurveyAggregate::default()
        };
        let b = SurveyAggregate {
            employer_responses: 6,
            candidate_responses: 5,
            candidate_responses_week: 2,
            ..SurveyAggregate::default()
        };
        let volume = SurveyVolume::tally([&a, &b]);
        assert_eq!(
            volume,
            SurveyVolume {
                total_employer: 10,
                total_candidate: 7,
                weekly_employer: 1,
                weekly_candidate: 2,
            }
        );
    }
}
