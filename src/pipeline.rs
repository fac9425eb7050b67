//! Batch run: a per-board map step fanned out over a bounded worker pool,
//! followed by a reduce step that ranks and aggregates across boards.
//!
//! A board that fails to load is recorded as a [`BoardFailure`] and the run
//! carries on. Cancellation is checked before each board starts; boards
//! already being analysed finish and are reported.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::{
    self, BoardProfile, HiringVelocity, IndustryAggregate, RoleAggregate, RoleRecommendation,
};
use crate::bands::TABLE_VERSION;
use crate::config::EngineConfig;
use crate::error::{BoardFailure, EngineError};
use crate::insights::{self, BoardMovement, SurveyVolume, WeeklyInsights};
use crate::lifespan::{
    self, LifespanBucket, LifespanMetrics, PostingLifespan, RoleLifespan,
};
use crate::models::{Board, PostingEvent, PostingObservation, ScoreSnapshot, SurveyAggregate};
use crate::reposts::{self, RepostCluster, RepostDetector, RepostStats};
use crate::scoring::{self, EfficiencyScore, ScoreBucket, ScoreInputs};
use crate::store::HistorySource;
use crate::trends::{
    self, AnomalyAlert, RoleTrend, TrendMetrics, WeekCounts, WeeklyComparison,
};

#[derive(Debug, Clone, Serialize)]
pub struct BoardAnalysis {
    pub board: Board,
    pub industry: String,
    /// Only clusters that actually contain reposts.
    pub repost_clusters: Vec<RepostCluster>,
    pub repost_stats: RepostStats,
    pub lifespan: LifespanMetrics,
    pub lifespan_distribution: Vec<LifespanBucket>,
    pub role_lifespans: Vec<RoleLifespan>,
    pub score: EfficiencyScore,
    pub survey: SurveyAggregate,
    pub movement: Option<BoardMovement>,
    pub snapshot: ScoreSnapshot,
    pub trend: TrendMetrics,
    pub weekly: WeeklyComparison,
    pub anomalies: Vec<AnomalyAlert>,
    #[serde(skip)]
    pub posting_lifespans: Vec<PostingLifespan>,
    #[serde(skip)]
    pub profile: BoardProfile,
    #[serde(skip)]
    pub role_counts: BTreeMap<String, WeekCounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub table_version: u32,
    pub boards: Vec<BoardAnalysis>,
    pub rankings: Vec<EfficiencyScore>,
    pub score_distribution: Vec<ScoreBucket>,
    pub role_lifespans: Vec<RoleLifespan>,
    pub role_aggregates: Vec<RoleAggregate>,
    pub industry_aggregates: Vec<IndustryAggregate>,
    pub hiring_velocity: Vec<HiringVelocity>,
    pub role_trends: Vec<RoleTrend>,
    pub recommendations: Vec<RoleRecommendation>,
    pub weekly_insights: WeeklyInsights,
    pub failures: Vec<BoardFailure>,
    pub cancelled: bool,
    pub skipped_boards: Vec<String>,
}

impl RunReport {
    pub fn scored_boards(&self) -> usize {
        self.rankings.iter().filter(|s| s.is_scored()).count()
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyAlert> {
        self.boards.iter().flat_map(|b| b.anomalies.iter())
    }
}

/// Inputs for one board, as read from the history source.
pub struct BoardHistory {
    pub observations: Vec<PostingObservation>,
    pub events: Vec<PostingEvent>,
    pub survey: SurveyAggregate,
    pub snapshots: Vec<ScoreSnapshot>,
}

enum BoardOutcome {
    Analysed(Box<BoardAnalysis>),
    Failed(BoardFailure),
    Skipped(Board),
}

/// Pure per-board computation. `history.snapshots` are prior snapshots; a
/// snapshot for `now`'s date is replaced by the freshly computed one.
/// Observations and events dated after `now` are ignored, so a backdated run
/// sees only the history that existed at that point.
pub fn analyze_board(
    board: &Board,
    history: BoardHistory,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> BoardAnalysis {
    let as_of = now.date_naive();
    let BoardHistory {
        observations,
        events,
        survey,
        snapshots,
    } = history;
    let observations: Vec<PostingObservation> = observations
        .into_iter()
        .filter(|o| o.first_seen <= now)
        .collect();
    let events: Vec<PostingEvent> = events.into_iter().filter(|e| e.event_date <= now).collect();

    let clusters = RepostDetector::new(&config.matching).detect(&observations);
    let repost_stats = reposts::repost_stats(board.id, &board.name, &clusters);

    let posting_lifespans = lifespan::posting_lifespans(&board.name, &observations, &events, now);
    let lifespan = lifespan::lifespan_metrics(board.id, &board.name, &posting_lifespans);
    let lifespan_distribution = lifespan::lifespan_distribution(&posting_lifespans);
    let role_lifespans = lifespan::role_lifespans(&posting_lifespans);

    let score = scoring::score_board(&ScoreInputs {
        board_id: board.id,
        board_name: board.name.clone(),
        total_postings: repost_stats.total_postings,
        avg_lifespan_days: lifespan.summary.avg_lifespan,
        repost_rate: repost_stats.repost_percentage,
        survey: survey.clone(),
    });

    // Distinct postings only; a repost folds into its original.
    let reposted = reposts::reposted_posting_ids(&clusters);
    let originals: Vec<PostingObservation> = observations
        .iter()
        .filter(|o| !reposted.contains(&o.posting_id))
        .cloned()
        .collect();
    let new_postings = originals
        .iter()
        .filter(|o| o.first_seen.date_naive() == as_of)
        .count();
    let snapshot = ScoreSnapshot {
        board_id: board.id,
        snapshot_date: as_of,
        overall_score: score.overall_score.map(f64::from),
        avg_lifespan: lifespan.summary.avg_lifespan,
        repost_rate: repost_stats.repost_percentage,
        new_postings: new_postings as i64,
        total_postings: repost_stats.total_postings as i64,
    };

    let mut timeline: Vec<ScoreSnapshot> = snapshots
        .into_iter()
        .filter(|s| s.snapshot_date < as_of)
        .collect();
    timeline.push(snapshot.clone());

    let trend = trends::board_trend(board.id, &timeline, as_of, config.trends.window_days);
    let weekly = trends::weekly_comparison(board.id, &timeline, as_of, &config.trends);
    let movement = insights::board_movement(
        board,
        &score,
        &timeline,
        &survey,
        as_of,
        config.trends.movement_points,
    );
    let activity = trends::daily_activity(&originals, as_of);
    let anomalies =
        trends::anomalies_for_board(board.id, &board.name, &timeline, &activity, as_of, &config.trends);

    let profile = BoardProfile::build(board, &score, &trend, &originals, now, config);
    let role_counts = trends::role_week_counts(&originals, now);

    debug!(
        board = %board.name,
        clusters = clusters.len(),
        score = ?score.overall_score,
        anomalies = anomalies.len(),
        "board analysed"
    );

    BoardAnalysis {
        board: board.clone(),
        industry: profile.industry.clone(),
        repost_clusters: clusters.into_iter().filter(|c| c.total_reposts > 0).collect(),
        repost_stats,
        lifespan,
        lifespan_distribution,
        role_lifespans,
        score,
        survey,
        movement,
        snapshot,
        trend,
        weekly,
        anomalies,
        posting_lifespans,
        profile,
        role_counts,
    }
}

async fn load_history(
    source: &dyn HistorySource,
    board: &Board,
    now: DateTime<Utc>,
) -> Result<BoardHistory, BoardFailure> {
    let fail = |stage: &str, error: EngineError| BoardFailure::new(board.id, &board.name, stage, error);

    let observations = source
        .observations(board.id)
        .await
        .map_err(|e| fail("observations", e))?;
    let events = source.events(board.id).await.map_err(|e| fail("events", e))?;
    let survey = source.survey(board.id, now).await.map_err(|e| fail("survey", e))?;
    let snapshots = source
        .snapshots(board.id)
        .await
        .map_err(|e| fail("snapshots", e))?;

    Ok(BoardHistory {
        observations,
        events,
        survey,
        snapshots,
    })
}

pub async fn run(
    source: Arc<dyn HistorySource>,
    config: Arc<EngineConfig>,
    now: DateTime<Utc>,
    cancel: watch::Receiver<bool>,
) -> Result<RunReport, EngineError> {
    let boards = source.boards().await?;
    info!(boards = boards.len(), workers = config.run.workers, %now, "starting run");

    let permits = Arc::new(Semaphore::new(config.run.workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut names: HashMap<tokio::task::Id, Board> = HashMap::new();

    for board in boards {
        let source = Arc::clone(&source);
        let config = Arc::clone(&config);
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();
        let task_board = board.clone();

        let handle = tasks.spawn(async move {
            let board = task_board;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return BoardOutcome::Failed(BoardFailure::new(board.id, &board.name, "schedule", e)),
            };
            if *cancel.borrow() {
                return BoardOutcome::Skipped(board);
            }
            match load_history(source.as_ref(), &board, now).await {
                Ok(history) => BoardOutcome::Analysed(Box::new(analyze_board(&board, history, &config, now))),
                Err(failure) => BoardOutcome::Failed(failure),
            }
        });
        names.insert(handle.id(), board);
    }

    let mut analyses = Vec::new();
    let mut failures = Vec::new();
    let mut skipped = Vec::new();

    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, BoardOutcome::Analysed(analysis))) => analyses.push(*analysis),
            Ok((_, BoardOutcome::Failed(failure))) => {
                warn!(board = %failure.board_name, board_id = %failure.board_id, stage = %failure.stage, error = %failure.error, "board failed");
                failures.push(failure);
            }
            Ok((_, BoardOutcome::Skipped(board))) => skipped.push(board.name),
            Err(e) => {
                let failure = match names.get(&e.id()) {
                    Some(board) => BoardFailure::new(board.id, &board.name, "task", &e),
                    None => BoardFailure::new(Uuid::nil(), "unknown", "task", &e),
                };
                warn!(board = %failure.board_name, error = %failure.error, "board task aborted");
                failures.push(failure);
            }
        }
    }

    let report = reduce(analyses, failures, skipped, &config, now);
    info!(
        scored = report.scored_boards(),
        analysed = report.boards.len(),
        failures = report.failures.len(),
        cancelled = report.cancelled,
        "run complete"
    );
    Ok(report)
}

/// Cross-board step: ranking, distribution and roll-ups.
pub fn reduce(
    mut analyses: Vec<BoardAnalysis>,
    mut failures: Vec<BoardFailure>,
    mut skipped: Vec<String>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> RunReport {
    analyses.sort_by(|a, b| a.board.name.cmp(&b.board.name));
    failures.sort_by(|a, b| a.board_name.cmp(&b.board_name));
    skipped.sort();

    let mut rankings: Vec<EfficiencyScore> = analyses.iter().map(|a| a.score.clone()).collect();
    scoring::rank_scores(&mut rankings);
    let placement: HashMap<Uuid, (Option<usize>, Option<f64>)> = rankings
        .iter()
        .map(|s| (s.board_id, (s.rank, s.percentile)))
        .collect();
    for analysis in &mut analyses {
        if let Some((rank, percentile)) = placement.get(&analysis.board.id) {
            analysis.score.rank = *rank;
            analysis.score.percentile = *percentile;
        }
    }

    let all_lifespans: Vec<PostingLifespan> = analyses
        .iter()
        .flat_map(|a| a.posting_lifespans.iter().cloned())
        .collect();
    let profiles: Vec<BoardProfile> = analyses.iter().map(|a| a.profile.clone()).collect();

    let mut week_counts = BTreeMap::new();
    for analysis in &analyses {
        trends::merge_week_counts(&mut week_counts, &analysis.role_counts);
    }
    let role_trends = trends::role_trends(&week_counts);
    let role_aggregates = aggregate::role_aggregates(&profiles, &role_trends);
    let recommendations = aggregate::role_recommendations(&profiles, &role_aggregates);

    let movements: Vec<BoardMovement> = analyses.iter().filter_map(|a| a.movement.clone()).collect();
    let weekly_insights = insights::weekly_insights(
        &movements,
        SurveyVolume::tally(analyses.iter().map(|a| &a.survey)),
        now.date_naive(),
    );

    RunReport {
        run_id: Uuid::new_v4(),
        generated_at: now,
        as_of: now.date_naive(),
        table_version: TABLE_VERSION,
        score_distribution: scoring::score_distribution(&rankings),
        role_lifespans: lifespan::role_lifespans(&all_lifespans),
        industry_aggregates: aggregate::industry_aggregates(&profiles),
        hiring_velocity: aggregate::hiring_velocity(&profiles, &config.demand),
        role_aggregates,
        recommendations,
        weekly_insights,
        role_trends,
        rankings,
        boards: analyses,
        failures,
        cancelled: !skipped.is_empty(),
        skipped_boards: skipped,
    }
}
