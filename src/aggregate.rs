//! Roll-ups of per-board results by role family and by industry.
//!
//! Every board counts once toward an average, however many postings it has.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::bands::{self, DemandLevel, Grade};
use crate::config::{DemandThresholds, EngineConfig};
use crate::models::{Board, PostingObservation};
use crate::normalize::role_family_or_classified;
use crate::scoring::EfficiencyScore;
use crate::stats::{mean, median, round_to, sorted};
use crate::trends::{classify, RoleTrend, TrendDirection, TrendMetrics};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub total: usize,
    pub recent: usize,
}

/// What the reduce step needs to know about one analysed board.
#[derive(Debug, Clone, Serialize)]
pub struct BoardProfile {
    pub board_id: Uuid,
    pub board_name: String,
    pub industry: String,
    pub industry_description: String,
    pub overall_score: Option<u32>,
    pub total_postings: usize,
    pub trend_change_percent: Option<f64>,
    pub roles: BTreeMap<String, RoleCounts>,
}

impl BoardProfile {
    pub fn build(
        board: &Board,
        score: &EfficiencyScore,
        trend: &TrendMetrics,
        observations: &[PostingObservation],
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Self {
        let since = now - Duration::days(config.demand.velocity_window_days);
        let mut roles: BTreeMap<String, RoleCounts> = BTreeMap::new();
        for observation in observations {
            let role = role_family_or_classified(&observation.role_family, &observation.title);
            let counts = roles.entry(role).or_default();
            counts.total += 1;
            if observation.first_seen > since && observation.first_seen <= now {
                counts.recent += 1;
            }
        }

        let (industry, industry_description) =
            config.industry_for(&board.name, board.industry.as_deref());

        Self {
            board_id: board.id,
            board_name: board.name.clone(),
            industry,
            industry_description,
            overall_score: score.overall_score,
            total_postings: observations.len(),
            trend_change_percent: trend
                .earliest_score
                .is_some()
                .then_some(trend.score_change_percent),
            roles,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleAggregate {
    pub role_family: String,
    pub avg_score: Option<f64>,
    pub median_score: Option<f64>,
    pub min_score: Option<u32>,
    pub max_score: Option<u32>,
    pub job_count: usize,
    pub board_count: usize,
    pub scored_board_count: usize,
    pub best_board: Option<String>,
    pub worst_board: Option<String>,
    pub trend: Option<TrendDirection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndustryAggregate {
    pub industry: String,
    pub description: String,
    pub avg_score: Option<f64>,
    pub median_score: Option<f64>,
    pub job_count: usize,
    pub board_count: usize,
    pub top_board: Option<String>,
    pub top_role: Option<String>,
    pub jobs_by_role: BTreeMap<String, usize>,
    pub trend: Option<TrendDirection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HiringVelocity {
    pub role_family: String,
    pub job_count: usize,
    pub new_jobs: usize,
    pub new_jobs_per_day: f64,
    pub demand_level: DemandLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedBoard {
    pub board_name: String,
    pub overall_score: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleRecommendation {
    pub role_family: String,
    pub grade: Option<Grade>,
    pub top_boards: Vec<RankedBoard>,
    pub recommendation: String,
}

struct ScoreSummary {
    avg: Option<f64>,
    median: Option<f64>,
    min: Option<u32>,
    max: Option<u32>,
    scored: usize,
}

fn summarize_scores(scores: &[u32]) -> ScoreSummary {
    let values: Vec<f64> = scores.iter().map(|s| *s as f64).collect();
    let ordered = sorted(&values);
    ScoreSummary {
        avg: mean(&values).map(|v| round_to(v, 1)),
        median: median(&ordered),
        min: scores.iter().min().copied(),
        max: scores.iter().max().copied(),
        scored: scores.len(),
    }
}

/// Highest (or lowest) scored board; name breaks ties.
fn pick_board<'a>(boards: &[&'a BoardProfile], best: bool) -> Option<&'a BoardProfile> {
    boards
        .iter()
        .filter(|b| b.overall_score.is_some())
        .min_by(|a, b| {
            let by_score = a.overall_score.cmp(&b.overall_score);
            let by_score = if best { by_score.reverse() } else { by_score };
            by_score.then_with(|| a.board_name.cmp(&b.board_name))
        })
        .copied()
}

fn by_avg_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn boards_for_role<'a>(profiles: &'a [BoardProfile], role: &str) -> Vec<&'a BoardProfile> {
    profiles
        .iter()
        .filter(|p| p.roles.get(role).is_some_and(|c| c.total > 0))
        .collect()
}

fn role_names(profiles: &[BoardProfile]) -> Vec<String> {
    let mut roles: Vec<String> = profiles
        .iter()
        .flat_map(|p| p.roles.keys().cloned())
        .collect();
    roles.sort();
    roles.dedup();
    roles
}

pub fn role_aggregates(profiles: &[BoardProfile], role_trends: &[RoleTrend]) -> Vec<RoleAggregate> {
    let mut aggregates: Vec<RoleAggregate> = role_names(profiles)
        .into_iter()
        .map(|role| {
            let boards = boards_for_role(profiles, &role);
            let scores: Vec<u32> = boards.iter().filter_map(|b| b.overall_score).collect();
            let summary = summarize_scores(&scores);
            let job_count = boards
                .iter()
                .filter_map(|b| b.roles.get(&role))
                .map(|c| c.total)
                .sum();

            RoleAggregate {
                avg_score: summary.avg,
                median_score: summary.median,
                min_score: summary.min,
                max_score: summary.max,
                job_count,
                board_count: boards.len(),
                scored_board_count: summary.scored,
                best_board: pick_board(&boards, true).map(|b| b.board_name.clone()),
                worst_board: pick_board(&boards, false).map(|b| b.board_name.clone()),
                trend: role_trends
                    .iter()
                    .find(|t| t.role_family == role)
                    .map(|t| t.direction),
                role_family: role,
            }
        })
        .collect();

    aggregates.sort_by(|a, b| {
        by_avg_desc(a.avg_score, b.avg_score).then_with(|| a.role_family.cmp(&b.role_family))
    });
    aggregates
}

pub fn industry_aggregates(profiles: &[BoardProfile]) -> Vec<IndustryAggregate> {
    let mut groups: BTreeMap<&str, Vec<&BoardProfile>> = BTreeMap::new();
    for profile in profiles {
        groups.entry(profile.industry.as_str()).or_default().push(profile);
    }

    let mut aggregates: Vec<IndustryAggregate> = groups
        .into_iter()
        .map(|(industry, boards)| {
            let scores: Vec<u32> = boards.iter().filter_map(|b| b.overall_score).collect();
            let summary = summarize_scores(&scores);

            let mut jobs_by_role: BTreeMap<String, usize> = BTreeMap::new();
            for board in &boards {
                for (role, counts) in &board.roles {
                    *jobs_by_role.entry(role.clone()).or_insert(0) += counts.total;
                }
            }
            // BTreeMap order makes the first maximum the alphabetically first role.
            let top_role = jobs_by_role
                .iter()
                .fold(None::<(&String, usize)>, |best, (role, count)| match best {
                    Some((_, best_count)) if best_count >= *count => best,
                    _ => Some((role, *count)),
                })
                .map(|(role, _)| role.clone());

            let changes: Vec<f64> = boards.iter().filter_map(|b| b.trend_change_percent).collect();
            let trend = mean(&changes).map(|avg| classify(avg, avg).0);

            IndustryAggregate {
                industry: industry.to_string(),
                description: boards
                    .first()
                    .map(|b| b.industry_description.clone())
                    .unwrap_or_default(),
                avg_score: summary.avg,
                median_score: summary.median,
                job_count: boards.iter().map(|b| b.total_postings).sum(),
                board_count: boards.len(),
                top_board: pick_board(&boards, true).map(|b| b.board_name.clone()),
                top_role,
                jobs_by_role,
                trend,
            }
        })
        .collect();

    aggregates.sort_by(|a, b| {
        by_avg_desc(a.avg_score, b.avg_score).then_with(|| a.industry.cmp(&b.industry))
    });
    aggregates
}

pub fn hiring_velocity(profiles: &[BoardProfile], thresholds: &DemandThresholds) -> Vec<HiringVelocity> {
    let window = thresholds.velocity_window_days.max(1) as f64;
    let mut velocity: Vec<HiringVelocity> = role_names(profiles)
        .into_iter()
        .map(|role| {
            let (job_count, new_jobs) = profiles
                .iter()
                .filter_map(|p| p.roles.get(&role))
                .fold((0, 0), |(total, recent), c| (total + c.total, recent + c.recent));
            let per_day = new_jobs as f64 / window;
            HiringVelocity {
                demand_level: bands::demand_level(job_count, per_day, thresholds),
                role_family: role,
                job_count,
                new_jobs,
                new_jobs_per_day: round_to(per_day, 2),
            }
        })
        .collect();

    velocity.sort_by(|a, b| {
        b.new_jobs
            .cmp(&a.new_jobs)
            .then_with(|| b.job_count.cmp(&a.job_count))
            .then_with(|| a.role_family.cmp(&b.role_family))
    });
    velocity
}

pub fn role_recommendations(
    profiles: &[BoardProfile],
    aggregates: &[RoleAggregate],
) -> Vec<RoleRecommendation> {
    aggregates
        .iter()
        .map(|aggregate| {
            let mut boards: Vec<RankedBoard> = boards_for_role(profiles, &aggregate.role_family)
                .into_iter()
                .filter_map(|b| {
                    b.overall_score.map(|score| RankedBoard {
                        board_name: b.board_name.clone(),
                        overall_score: score,
                    })
                })
                .collect();
            boards.sort_by(|a, b| {
                b.overall_score
                    .cmp(&a.overall_score)
                    .then_with(|| a.board_name.cmp(&b.board_name))
            });
            boards.truncate(3);

            let grade = aggregate.avg_score.map(Grade::for_score);
            RoleRecommendation {
                role_family: aggregate.role_family.clone(),
                grade,
                top_boards: boards,
                recommendation: bands::recommendation(&aggregate.role_family, grade),
            }
        })
        .collect()
}
