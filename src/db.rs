use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bands::TABLE_VERSION;
use crate::error::{BoardFailure, EngineError, EngineResult};
use crate::models::{Board, EventType, PostingEvent, PostingObservation, ScoreSnapshot, SurveyAggregate};
use crate::pipeline::{BoardAnalysis, RunReport};
use crate::store::HistorySource;

pub async fn init_db(pool: &PgPool) -> EngineResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed history, read from the `board_intel` schema.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Per-board read failures are reported against the board they were for.
    fn unavailable(board_id: Uuid) -> impl FnOnce(sqlx::Error) -> EngineError {
        move |source| EngineError::Source {
            board: board_id.to_string(),
            message: source.to_string(),
        }
    }
}

#[async_trait]
impl HistorySource for PgStore {
    async fn boards(&self) -> EngineResult<Vec<Board>> {
        let rows = sqlx::query("SELECT id, name, industry FROM board_intel.boards ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Board {
                id: row.get("id"),
                name: row.get("name"),
                industry: row.get("industry"),
            })
            .collect())
    }

    async fn observations(&self, board_id: Uuid) -> EngineResult<Vec<PostingObservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, board_id, title, company, url, role_family, first_seen
            FROM board_intel.postings
            WHERE board_id = $1
            ORDER BY first_seen, id
            "#,
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::unavailable(board_id))?;

        Ok(rows
            .into_iter()
            .map(|row| PostingObservation {
                posting_id: row.get("id"),
                board_id: row.get("board_id"),
                title: row.get("title"),
                company: row.get("company"),
                url: row.get("url"),
                role_family: row.get("role_family"),
                first_seen: row.get("first_seen"),
            })
            .collect())
    }

    async fn events(&self, board_id: Uuid) -> EngineResult<Vec<PostingEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT e.posting_id, e.event_type, e.event_date, e.notes
            FROM board_intel.posting_events e
            JOIN board_intel.postings p ON p.id = e.posting_id
            WHERE p.board_id = $1
            ORDER BY e.event_date, e.id
            "#,
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::unavailable(board_id))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_type: String = row.get("event_type");
            events.push(PostingEvent {
                posting_id: row.get("posting_id"),
                event_type: event_type.parse()?,
                event_date: row.get("event_date"),
                notes: row.get("notes"),
            });
        }
        Ok(events)
    }

    async fn survey(&self, board_id: Uuid, as_of: DateTime<Utc>) -> EngineResult<SurveyAggregate> {
        // Ratings are stored on a 1-5 scale.
        let row = sqlx::query(
            r#"
            WITH employer AS (
                SELECT board_hiring_efficiency AS rating, created_at
                FROM board_intel.employer_surveys
                WHERE board_id = $1 AND created_at <= $2
            ),
            candidate AS (
                SELECT board_visibility_rating AS rating, created_at
                FROM board_intel.candidate_surveys
                WHERE board_id = $1 AND created_at <= $2
            )
            SELECT
                (SELECT AVG(rating)::float8 / 5.0 * 100.0 FROM employer) AS employer_score,
                (SELECT COUNT(rating) FROM employer) AS employer_responses,
                (SELECT COUNT(rating) FROM employer WHERE created_at > $3) AS employer_responses_week,
                (SELECT AVG(rating)::float8 / 5.0 * 100.0 FROM candidate) AS candidate_score,
                (SELECT COUNT(rating) FROM candidate) AS candidate_responses,
                (SELECT COUNT(rating) FROM candidate WHERE created_at > $3) AS candidate_responses_week
            "#,
        )
        .bind(board_id)
        .bind(as_of)
        .bind(as_of - Duration::days(7))
        .fetch_one(&self.pool)
        .await
        .map_err(Self::unavailable(board_id))?;

        Ok(SurveyAggregate {
            employer_score: row.get("employer_score"),
            employer_responses: row.get("employer_responses"),
            candidate_score: row.get("candidate_score"),
            candidate_responses: row.get("candidate_responses"),
            employer_responses_week: row.get("employer_responses_week"),
            candidate_responses_week: row.get("candidate_responses_week"),
        })
    }

    async fn snapshots(&self, board_id: Uuid) -> EngineResult<Vec<ScoreSnapshot>> {
        fetch_snapshots(&self.pool, board_id).await.map_err(|e| match e {
            EngineError::Database(source) => Self::unavailable(board_id)(source),
            other => other,
        })
    }
}

pub async fn fetch_snapshots(pool: &PgPool, board_id: Uuid) -> EngineResult<Vec<ScoreSnapshot>> {
    let rows = sqlx::query(
        r#"
        SELECT board_id, snapshot_date, overall_score, avg_lifespan, repost_rate,
               new_postings, total_postings
        FROM board_intel.score_snapshots
        WHERE board_id = $1
        ORDER BY snapshot_date
        "#,
    )
    .bind(board_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ScoreSnapshot {
            board_id: row.get("board_id"),
            snapshot_date: row.get("snapshot_date"),
            overall_score: row.get("overall_score"),
            avg_lifespan: row.get("avg_lifespan"),
            repost_rate: row.get("repost_rate"),
            new_postings: row.get("new_postings"),
            total_postings: row.get("total_postings"),
        })
        .collect())
}

pub async fn find_board(pool: &PgPool, name: &str) -> EngineResult<Option<Board>> {
    let row = sqlx::query("SELECT id, name, industry FROM board_intel.boards WHERE lower(name) = lower($1)")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| Board {
        id: row.get("id"),
        name: row.get("name"),
        industry: row.get("industry"),
    }))
}

#[derive(Debug, Default)]
pub struct PersistSummary {
    pub scores: usize,
    pub snapshots: usize,
    pub anomalies: usize,
    pub failures: Vec<BoardFailure>,
}

/// Upserts every analysed board's outputs keyed by board and date, one
/// transaction per board, so a re-run on the same day replaces its own rows
/// and never touches earlier days. A board that cannot be stored is recorded
/// and the remaining boards are still written.
pub async fn persist_run(pool: &PgPool, report: &RunReport) -> PersistSummary {
    let summary = persist_boards(&report.boards, |analysis| persist_board(pool, report, analysis)).await;

    info!(
        scores = summary.scores,
        anomalies = summary.anomalies,
        failures = summary.failures.len(),
        as_of = %report.as_of,
        "run persisted"
    );
    summary
}

async fn persist_boards<'a, F, Fut>(boards: &'a [BoardAnalysis], mut store: F) -> PersistSummary
where
    F: FnMut(&'a BoardAnalysis) -> Fut,
    Fut: Future<Output = EngineResult<()>>,
{
    let mut summary = PersistSummary::default();

    for analysis in boards {
        match store(analysis).await {
            Ok(()) => {
                summary.scores += 1;
                summary.snapshots += 1;
                summary.anomalies += analysis.anomalies.len();
            }
            Err(e) => {
                warn!(board = %analysis.board.name, error = %e, "failed to store board results");
                summary
                    .failures
                    .push(BoardFailure::new(analysis.board.id, &analysis.board.name, "persist", e));
            }
        }
    }
    summary
}

async fn persist_board(pool: &PgPool, report: &RunReport, analysis: &BoardAnalysis) -> EngineResult<()> {
    let mut tx = pool.begin().await?;
    upsert_score(&mut tx, report.run_id, report.as_of, analysis).await?;
    upsert_snapshot(&mut tx, &analysis.snapshot).await?;
    replace_anomalies(&mut tx, report.as_of, analysis).await?;
    tx.commit().await?;
    Ok(())
}

async fn upsert_score(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    as_of: NaiveDate,
    analysis: &BoardAnalysis,
) -> EngineResult<()> {
    let score = &analysis.score;
    sqlx::query(
        r#"
        INSERT INTO board_intel.efficiency_scores
        (board_id, score_date, run_id, overall_score, grade, lifespan_score, repost_score,
         employer_score, candidate_score, quality_adjustment, repost_rate, data_completeness,
         suppression_reason, rank, percentile, table_version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (board_id, score_date) DO UPDATE
        SET run_id = EXCLUDED.run_id,
            overall_score = EXCLUDED.overall_score,
            grade = EXCLUDED.grade,
            lifespan_score = EXCLUDED.lifespan_score,
            repost_score = EXCLUDED.repost_score,
            employer_score = EXCLUDED.employer_score,
            candidate_score = EXCLUDED.candidate_score,
            quality_adjustment = EXCLUDED.quality_adjustment,
            repost_rate = EXCLUDED.repost_rate,
            data_completeness = EXCLUDED.data_completeness,
            suppression_reason = EXCLUDED.suppression_reason,
            rank = EXCLUDED.rank,
            percentile = EXCLUDED.percentile,
            table_version = EXCLUDED.table_version,
            computed_at = NOW()
        "#,
    )
    .bind(score.board_id)
    .bind(as_of)
    .bind(run_id)
    .bind(score.overall_score.map(|s| s as i32))
    .bind(score.grade.map(|g| g.label()))
    .bind(score.components.lifespan.score)
    .bind(score.components.repost.score)
    .bind(score.components.employer_survey.score)
    .bind(score.components.candidate_survey.score)
    .bind(score.quality_adjustment)
    .bind(score.repost_rate)
    .bind(score.data_completeness)
    .bind(score.suppression.as_ref().map(|reason| reason.describe()))
    .bind(score.rank.map(|r| r as i32))
    .bind(score.percentile)
    .bind(TABLE_VERSION as i32)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_snapshot(tx: &mut Transaction<'_, Postgres>, snapshot: &ScoreSnapshot) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO board_intel.score_snapshots
        (board_id, snapshot_date, overall_score, avg_lifespan, repost_rate, new_postings, total_postings)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (board_id, snapshot_date) DO UPDATE
        SET overall_score = EXCLUDED.overall_score,
            avg_lifespan = EXCLUDED.avg_lifespan,
            repost_rate = EXCLUDED.repost_rate,
            new_postings = EXCLUDED.new_postings,
            total_postings = EXCLUDED.total_postings
        "#,
    )
    .bind(snapshot.board_id)
    .bind(snapshot.snapshot_date)
    .bind(snapshot.overall_score)
    .bind(snapshot.avg_lifespan)
    .bind(snapshot.repost_rate)
    .bind(snapshot.new_postings)
    .bind(snapshot.total_postings)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Today's alerts for a board are rewritten wholesale; an alert that no longer
/// fires on a re-run must not linger.
async fn replace_anomalies(
    tx: &mut Transaction<'_, Postgres>,
    as_of: NaiveDate,
    analysis: &BoardAnalysis,
) -> EngineResult<()> {
    sqlx::query("DELETE FROM board_intel.anomaly_alerts WHERE board_id = $1 AND alert_date = $2")
        .bind(analysis.board.id)
        .bind(as_of)
        .execute(&mut **tx)
        .await?;

    for alert in &analysis.anomalies {
        sqlx::query(
            r#"
            INSERT INTO board_intel.anomaly_alerts
            (board_id, alert_date, metric, current_value, expected_value, std_dev,
             deviation, severity, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (board_id, alert_date, metric) DO UPDATE
            SET current_value = EXCLUDED.current_value,
                expected_value = EXCLUDED.expected_value,
                std_dev = EXCLUDED.std_dev,
                deviation = EXCLUDED.deviation,
                severity = EXCLUDED.severity,
                description = EXCLUDED.description
            "#,
        )
        .bind(alert.board_id)
        .bind(alert.alert_date)
        .bind(alert.metric.as_str())
        .bind(alert.current_value)
        .bind(alert.expected_value)
        .bind(alert.std_dev)
        .bind(alert.deviation)
        .bind(alert.severity.as_str())
        .bind(&alert.description)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn upsert_board(pool: &PgPool, name: &str, industry: Option<&str>) -> EngineResult<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO board_intel.boards AS b (id, name, industry)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE
        SET industry = COALESCE(EXCLUDED.industry, b.industry)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(industry)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

struct NewPosting<'a> {
    board_id: Uuid,
    title: &'a str,
    company: &'a str,
    url: &'a str,
    role_family: &'a str,
    first_seen: DateTime<Utc>,
    source_key: &'a str,
}

/// Inserts a posting unless its source key is already known; returns the stored id.
async fn insert_posting(pool: &PgPool, posting: &NewPosting<'_>) -> EngineResult<(Uuid, bool)> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO board_intel.postings
        (id, board_id, title, company, url, role_family, first_seen, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(posting.board_id)
    .bind(posting.title)
    .bind(posting.company)
    .bind(posting.url)
    .bind(posting.role_family)
    .bind(posting.first_seen)
    .bind(posting.source_key)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = inserted {
        return Ok((row.get("id"), true));
    }

    let id: Uuid = sqlx::query("SELECT id FROM board_intel.postings WHERE source_key = $1")
        .bind(posting.source_key)
        .fetch_one(pool)
        .await?
        .get("id");
    Ok((id, false))
}

async fn insert_event(
    pool: &PgPool,
    posting_id: Uuid,
    event_type: EventType,
    event_date: DateTime<Utc>,
    notes: Option<&str>,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO board_intel.posting_events (id, posting_id, event_type, event_date, notes)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (posting_id, event_type, event_date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(posting_id)
    .bind(event_type.as_str())
    .bind(event_date)
    .bind(notes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_survey(
    pool: &PgPool,
    table: SurveyTable,
    board_id: Uuid,
    rating: i32,
    source_key: &str,
) -> EngineResult<()> {
    let query = match table {
        SurveyTable::Employer => {
            r#"
            INSERT INTO board_intel.employer_surveys (id, board_id, board_hiring_efficiency, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#
        }
        SurveyTable::Candidate => {
            r#"
            INSERT INTO board_intel.candidate_surveys (id, board_id, board_visibility_rating, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#
        }
    };
    sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(board_id)
        .bind(rating)
        .bind(source_key)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Clone, Copy)]
enum SurveyTable {
    Employer,
    Candidate,
}

/// Loads three boards with a few weeks of postings, lifecycle events and
/// survey responses. Safe to run repeatedly.
pub async fn seed(pool: &PgPool, now: DateTime<Utc>) -> EngineResult<usize> {
    let boards = [
        ("LinkedIn", None, [4, 4, 3], [4, 3, 4]),
        ("Stack Overflow Jobs", Some("Tech"), [5, 4, 5], [4, 5, 4]),
        ("We Work Remotely", Some("Remote"), [3, 3, 2], [3, 4, 3]),
    ];
    let roles = [
        ("Senior Backend Engineer", "Northwind", "software-engineer"),
        ("Product Designer", "Contoso", "designer"),
        ("Data Scientist", "Fabrikam", "data-scientist"),
        ("Account Executive", "Tailspin", "sales"),
        ("Site Reliability Engineer", "Litware", "devops-infrastructure"),
        ("Product Manager", "Adatum", "product-manager"),
    ];

    let mut inserted = 0usize;
    for (board_index, (name, industry, employer, candidate)) in boards.iter().enumerate() {
        let board_id = upsert_board(pool, name, *industry).await?;
        let slug = name.to_lowercase().replace(' ', "-");

        for (i, rating) in employer.iter().enumerate() {
            insert_survey(pool, SurveyTable::Employer, board_id, *rating, &format!("seed-{slug}-employer-{i}")).await?;
        }
        for (i, rating) in candidate.iter().enumerate() {
            insert_survey(pool, SurveyTable::Candidate, board_id, *rating, &format!("seed-{slug}-candidate-{i}")).await?;
        }

        for week in 0..6i64 {
            for (role_index, (title, company, role_family)) in roles.iter().enumerate() {
                // Every third board/role pair is re-listed each week under a fresh URL.
                let relisted = (board_index + role_index) % 3 == 0 && week > 0;
                if week > 0 && !relisted && role_index % 2 == 1 {
                    continue;
                }
                let first_seen = now - Duration::days(42 - week * 7 - role_index as i64);
                let source_key = format!("seed-{slug}-{week}-{role_index}");
                let url = format!("https://{slug}.example.com/jobs/{week}{role_index}?utm_source=seed");
                let (posting_id, created) = insert_posting(
                    pool,
                    &NewPosting {
                        board_id,
                        title,
                        company,
                        url: &url,
                        role_family,
                        first_seen,
                        source_key: &source_key,
                    },
                )
                .await?;
                if created {
                    inserted += 1;
                }

                insert_event(pool, posting_id, EventType::Appeared, first_seen, None).await?;
                let lifespan = Duration::days(6 + (role_index as i64 * 3) + board_index as i64 * 4);
                if first_seen + lifespan < now {
                    insert_event(pool, posting_id, EventType::Disappeared, first_seen + lifespan, Some("seed")).await?;
                }
            }
        }
    }

    info!(inserted, "seed data loaded");
    Ok(inserted)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub postings: usize,
    pub events: usize,
    pub skipped_events: usize,
}

/// Imports an observation log. Columns: `posting_key, board, industry, title,
/// company, url, role_family, first_seen` (RFC 3339).
pub async fn import_observations(pool: &PgPool, csv_path: &Path) -> EngineResult<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        posting_key: String,
        board: String,
        industry: Option<String>,
        title: String,
        #[serde(default)]
        company: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        role_family: String,
        first_seen: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if row.posting_key.trim().is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "posting '{}' on board '{}' has no posting_key",
                row.title, row.board
            )));
        }
        let industry = row.industry.as_deref().filter(|value| !value.trim().is_empty());
        let board_id = upsert_board(pool, row.board.trim(), industry).await?;
        let (_, created) = insert_posting(
            pool,
            &NewPosting {
                board_id,
                title: &row.title,
                company: &row.company,
                url: &row.url,
                role_family: &row.role_family,
                first_seen: row.first_seen,
                source_key: &row.posting_key,
            },
        )
        .await?;
        if created {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Imports lifecycle events. Columns: `posting_key, event_type, event_date, notes`.
/// Events for unknown postings are skipped and counted.
pub async fn import_events(pool: &PgPool, csv_path: &Path) -> EngineResult<(usize, usize)> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        posting_key: String,
        event_type: String,
        event_date: DateTime<Utc>,
        notes: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let event_type: EventType = row.event_type.parse()?;
        let posting = sqlx::query("SELECT id FROM board_intel.postings WHERE source_key = $1")
            .bind(&row.posting_key)
            .fetch_optional(pool)
            .await?;

        let Some(posting) = posting else {
            warn!(posting_key = %row.posting_key, "event for unknown posting skipped");
            skipped += 1;
            continue;
        };

        let notes = row.notes.as_deref().filter(|value| !value.trim().is_empty());
        if insert_event(pool, posting.get("id"), event_type, row.event_date, notes).await? {
            inserted += 1;
        }
    }

    Ok((inserted, skipped))
}

pub async fn import(pool: &PgPool, observations: Option<&Path>, events: Option<&Path>) -> EngineResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    if let Some(path) = observations {
        summary.postings = import_observations(pool, path).await?;
    }
    if let Some(path) = events {
        let (inserted, skipped) = import_events(pool, path).await?;
        summary.events = inserted;
        summary.skipped_events = skipped;
    }
    Ok(summary)
}
