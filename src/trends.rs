//! Trend and anomaly tracking over score snapshot history.
//!
//! Everything here is a pure function of the snapshot history (plus observed
//! postings for the activity series) and an `as_of` date, so two runs over the
//! same history classify identically.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::TrendConfig;
use crate::models::{DailyActivity, PostingObservation, ScoreSnapshot};
use crate::normalize::role_family_or_classified;
use crate::stats::{mean, percentile_rank, round_to, std_dev};

const MIN_SIGMA: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStrength {
    Stable,
    Moderate,
    Strong,
}

impl TrendDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        }
    }

    fn with_deadband(change: f64, deadband: f64) -> Self {
        if change > deadband {
            TrendDirection::Up
        } else if change < -deadband {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        }
    }
}

pub fn strength_for(change_percent: f64) -> TrendStrength {
    let magnitude = change_percent.abs();
    if magnitude <= 2.0 {
        TrendStrength::Stable
    } else if magnitude <= 5.0 {
        TrendStrength::Moderate
    } else {
        TrendStrength::Strong
    }
}

/// Direction and strength for a change; a stable strength always reads as a stable direction.
pub fn classify(score_change: f64, change_percent: f64) -> (TrendDirection, TrendStrength) {
    let strength = strength_for(change_percent);
    let direction = match strength {
        TrendStrength::Stable => TrendDirection::Stable,
        _ if score_change > 0.0 => TrendDirection::Up,
        _ if score_change < 0.0 => TrendDirection::Down,
        _ => TrendDirection::Stable,
    };
    (direction, strength)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendMetrics {
    pub board_id: Uuid,
    pub window_days: i64,
    pub earliest_score: Option<f64>,
    pub latest_score: Option<f64>,
    pub score_change: f64,
    pub score_change_percent: f64,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub data_points: usize,
}

fn scored_in_range(
    snapshots: &[ScoreSnapshot],
    after: NaiveDate,
    through: NaiveDate,
) -> Vec<(NaiveDate, f64)> {
    let mut points: Vec<(NaiveDate, f64)> = snapshots
        .iter()
        .filter(|s| s.snapshot_date > after && s.snapshot_date <= through)
        .filter_map(|s| s.overall_score.map(|score| (s.snapshot_date, score)))
        .collect();
    points.sort_by(|a, b| a.0.cmp(&b.0));
    points
}

pub fn board_trend(
    board_id: Uuid,
    snapshots: &[ScoreSnapshot],
    as_of: NaiveDate,
    window_days: i64,
) -> TrendMetrics {
    let points = scored_in_range(snapshots, as_of - Duration::days(window_days), as_of);

    let (earliest, latest) = match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() >= 2 => (first.1, last.1),
        _ => {
            return TrendMetrics {
                board_id,
                window_days,
                earliest_score: None,
                latest_score: None,
                score_change: 0.0,
                score_change_percent: 0.0,
                direction: TrendDirection::Stable,
                strength: TrendStrength::Stable,
                data_points: points.len(),
            }
        }
    };

    let score_change = latest - earliest;
    let change_percent = if earliest == 0.0 {
        0.0
    } else {
        score_change / earliest * 100.0
    };
    let (direction, strength) = classify(score_change, change_percent);

    TrendMetrics {
        board_id,
        window_days,
        earliest_score: Some(earliest),
        latest_score: Some(latest),
        score_change: round_to(score_change, 2),
        score_change_percent: round_to(change_percent, 2),
        direction,
        strength,
        data_points: points.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekScore {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyComparison {
    pub board_id: Uuid,
    pub this_week_score: Option<f64>,
    pub last_week_score: Option<f64>,
    pub week_change: Option<f64>,
    pub direction: TrendDirection,
    pub trend_duration: usize,
    pub volatility: Option<f64>,
    /// Newest week first.
    pub weeks: Vec<WeekScore>,
}

pub fn weekly_comparison(
    board_id: Uuid,
    snapshots: &[ScoreSnapshot],
    as_of: NaiveDate,
    config: &TrendConfig,
) -> WeeklyComparison {
    let week_count = config.history_weeks.max(2);
    let weeks: Vec<WeekScore> = (0..week_count as i64)
        .map(|k| {
            let week_end = as_of - Duration::days(7 * k);
            let after = as_of - Duration::days(7 * (k + 1));
            let values: Vec<f64> = scored_in_range(snapshots, after, week_end)
                .into_iter()
                .map(|(_, score)| score)
                .collect();
            WeekScore {
                week_start: after + Duration::days(1),
                week_end,
                score: mean(&values).map(|m| round_to(m, 2)),
            }
        })
        .collect();

    // changes[k] = week k minus week k+1
    let changes: Vec<Option<f64>> = weeks
        .windows(2)
        .map(|pair| match (pair[0].score, pair[1].score) {
            (Some(current), Some(previous)) => Some(current - previous),
            _ => None,
        })
        .collect();

    let week_change = changes.first().copied().flatten();
    let direction = week_change
        .map(|change| TrendDirection::with_deadband(change, config.weekly_deadband))
        .unwrap_or(TrendDirection::Stable);

    let trend_duration = if direction == TrendDirection::Stable {
        0
    } else {
        changes
            .iter()
            .take_while(|change| {
                change.is_some_and(|c| {
                    TrendDirection::with_deadband(c, config.weekly_deadband) == direction
                })
            })
            .count()
    };

    let recent: Vec<f64> = changes
        .iter()
        .take(config.volatility_weeks)
        .filter_map(|c| *c)
        .collect();

    WeeklyComparison {
        board_id,
        this_week_score: weeks[0].score,
        last_week_score: weeks[1].score,
        week_change: week_change.map(|c| round_to(c, 2)),
        direction,
        trend_duration,
        volatility: std_dev(&recent).map(|v| round_to(v, 2)),
        weeks,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    pub fn for_deviation(deviation: f64) -> Option<Self> {
        if deviation > 3.0 {
            Some(AnomalySeverity::High)
        } else if deviation > 2.0 {
            Some(AnomalySeverity::Medium)
        } else if deviation > 1.0 {
            Some(AnomalySeverity::Low)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::Low => "low",
            AnomalySeverity::Medium => "medium",
            AnomalySeverity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyMetric {
    OverallScore,
    AvgLifespan,
    NewPostings,
}

impl AnomalyMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyMetric::OverallScore => "overall_score",
            AnomalyMetric::AvgLifespan => "avg_lifespan",
            AnomalyMetric::NewPostings => "new_postings",
        }
    }
}

impl fmt::Display for AnomalyMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyAlert {
    pub board_id: Uuid,
    pub board_name: String,
    pub metric: AnomalyMetric,
    pub alert_date: NaiveDate,
    pub current_value: f64,
    pub expected_value: f64,
    pub std_dev: f64,
    pub deviation: f64,
    pub severity: AnomalySeverity,
    pub description: String,
}

/// Deviation of `current` from a baseline, in baseline standard deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub expected: f64,
    pub sigma: f64,
    pub deviation: f64,
    pub severity: AnomalySeverity,
}

/// `None` when the baseline is too short, flat, or the value is within 1σ.
pub fn detect_anomaly(baseline: &[f64], current: f64, min_history: usize) -> Option<Deviation> {
    if baseline.is_empty() || baseline.len() < min_history {
        return None;
    }
    let expected = mean(baseline)?;
    let sigma = std_dev(baseline)?;
    if sigma < MIN_SIGMA {
        return None;
    }
    let deviation = (current - expected).abs() / sigma;
    AnomalySeverity::for_deviation(deviation).map(|severity| Deviation {
        expected,
        sigma,
        deviation,
        severity,
    })
}

/// Daily new-posting counts from the first observed day through `through`, zero-filled.
pub fn daily_activity(observations: &[PostingObservation], through: NaiveDate) -> Vec<DailyActivity> {
    let mut counts: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for observation in observations {
        *counts.entry(observation.first_seen.date_naive()).or_insert(0) += 1;
    }

    let Some(first) = counts.keys().next().copied() else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|day| *day <= through)
        .map(|day| DailyActivity {
            day,
            new_postings: counts.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

fn series_alert(
    board_id: Uuid,
    board_name: &str,
    metric: AnomalyMetric,
    series: &[(NaiveDate, f64)],
    as_of: NaiveDate,
    config: &TrendConfig,
) -> Option<AnomalyAlert> {
    let current = series.iter().find(|(day, _)| *day == as_of)?.1;
    let baseline_start = as_of - Duration::days(config.anomaly_baseline_days);
    let baseline: Vec<f64> = series
        .iter()
        .filter(|(day, _)| *day >= baseline_start && *day < as_of)
        .map(|(_, value)| *value)
        .collect();

    let found = detect_anomaly(&baseline, current, config.anomaly_min_history)?;
    let relation = if current > found.expected { "above" } else { "below" };
    Some(AnomalyAlert {
        board_id,
        board_name: board_name.to_string(),
        metric,
        alert_date: as_of,
        current_value: round_to(current, 2),
        expected_value: round_to(found.expected, 2),
        std_dev: round_to(found.sigma, 2),
        deviation: round_to(found.deviation, 2),
        severity: found.severity,
        description: format!(
            "{metric} of {current:.1} is {:.1} standard deviations {relation} the expected {:.1}",
            found.deviation, found.expected
        ),
    })
}

pub fn anomalies_for_board(
    board_id: Uuid,
    board_name: &str,
    snapshots: &[ScoreSnapshot],
    activity: &[DailyActivity],
    as_of: NaiveDate,
    config: &TrendConfig,
) -> Vec<AnomalyAlert> {
    let scores: Vec<(NaiveDate, f64)> = snapshots
        .iter()
        .filter_map(|s| s.overall_score.map(|v| (s.snapshot_date, v)))
        .collect();
    let lifespans: Vec<(NaiveDate, f64)> = snapshots
        .iter()
        .filter_map(|s| s.avg_lifespan.map(|v| (s.snapshot_date, v)))
        .collect();
    let postings: Vec<(NaiveDate, f64)> = activity
        .iter()
        .map(|a| (a.day, a.new_postings as f64))
        .collect();

    [
        (AnomalyMetric::OverallScore, scores),
        (AnomalyMetric::AvgLifespan, lifespans),
        (AnomalyMetric::NewPostings, postings),
    ]
    .iter()
    .filter_map(|(metric, series)| series_alert(board_id, board_name, *metric, series, as_of, config))
    .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeekCounts {
    pub this_week: usize,
    pub last_week: usize,
}

/// New postings per role family in the current and previous 7-day windows.
pub fn role_week_counts(
    observations: &[PostingObservation],
    now: DateTime<Utc>,
) -> BTreeMap<String, WeekCounts> {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);
    let mut counts: BTreeMap<String, WeekCounts> = BTreeMap::new();

    for observation in observations {
        let seen = observation.first_seen;
        if seen <= two_weeks_ago || seen > now {
            continue;
        }
        let role = role_family_or_classified(&observation.role_family, &observation.title);
        let entry = counts.entry(role).or_default();
        if seen > week_ago {
            entry.this_week += 1;
        } else {
            entry.last_week += 1;
        }
    }
    counts
}

pub fn merge_week_counts(into: &mut BTreeMap<String, WeekCounts>, from: &BTreeMap<String, WeekCounts>) {
    for (role, counts) in from {
        let entry = into.entry(role.clone()).or_default();
        entry.this_week += counts.this_week;
        entry.last_week += counts.last_week;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleTrend {
    pub role_family: String,
    pub this_week: usize,
    pub last_week: usize,
    pub demand_change: i64,
    pub growth: f64,
    pub hotness: f64,
    pub direction: TrendDirection,
}

pub fn role_trends(counts: &BTreeMap<String, WeekCounts>) -> Vec<RoleTrend> {
    let growth: HashMap<&str, f64> = counts
        .iter()
        .map(|(role, c)| {
            let change = c.this_week as f64 - c.last_week as f64;
            (role.as_str(), change / c.last_week.max(1) as f64)
        })
        .collect();
    let population: Vec<f64> = growth.values().copied().collect();

    let mut trends: Vec<RoleTrend> = counts
        .iter()
        .map(|(role, c)| {
            let demand_change = c.this_week as i64 - c.last_week as i64;
            let role_growth = growth.get(role.as_str()).copied().unwrap_or(0.0);
            RoleTrend {
                role_family: role.clone(),
                this_week: c.this_week,
                last_week: c.last_week,
                demand_change,
                growth: round_to(role_growth, 3),
                hotness: round_to(percentile_rank(&population, role_growth), 1),
                direction: TrendDirection::with_deadband(demand_change as f64, 0.0),
            }
        })
        .collect();

    trends.sort_by(|a, b| {
        b.hotness
            .partial_cmp(&a.hotness)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.role_family.cmp(&b.role_family))
    });
    trends
}
