use std::fmt::Write;

use crate::insights::BoardMovement;
use crate::pipeline::RunReport;

fn or_na(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "n/a".to_string(),
    }
}

fn listing(boards: &[BoardMovement]) -> String {
    if boards.is_empty() {
        return "-".to_string();
    }
    boards
        .iter()
        .map(|b| format!("{} {} ({:+.1})", b.board_name, b.current_score, b.score_change))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_report(report: &RunReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Board Intelligence Report");
    let _ = writeln!(
        output,
        "As of {} (run {}, scoring tables v{})",
        report.as_of, report.run_id, report.table_version
    );
    let _ = writeln!(
        output,
        "{} boards analysed, {} scored, {} failed",
        report.boards.len(),
        report.scored_boards(),
        report.failures.len()
    );
    if report.cancelled {
        let _ = writeln!(
            output,
            "Run cancelled before {} boards started: {}",
            report.skipped_boards.len(),
            report.skipped_boards.join(", ")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Board Rankings");
    let scored: Vec<_> = report.rankings.iter().filter(|s| s.is_scored()).collect();
    if scored.is_empty() {
        let _ = writeln!(output, "No boards could be scored for this run.");
    } else {
        for score in &scored {
            let _ = writeln!(
                output,
                "{}. {} score {} ({}) percentile {} | lifespan {:.0}, reposts {:.0}, employer {:.0}, candidate {:.0} x{:.2}",
                score.rank.unwrap_or_default(),
                score.board_name,
                score.overall_score.unwrap_or_default(),
                score.grade.map(|g| g.label()).unwrap_or("-"),
                or_na(score.percentile, 1),
                score.components.lifespan.score,
                score.components.repost.score,
                score.components.employer_survey.score,
                score.components.candidate_survey.score,
                score.quality_adjustment
            );
        }
    }

    let suppressed: Vec<_> = report.rankings.iter().filter(|s| !s.is_scored()).collect();
    if !suppressed.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Not Scored");
        for score in suppressed {
            let reason = score
                .suppression
                .as_ref()
                .map(|r| r.describe())
                .unwrap_or_default();
            let _ = writeln!(output, "- {}: {}", score.board_name, reason);
        }
    }

    if !scored.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Score Distribution");
        for bucket in &report.score_distribution {
            let _ = writeln!(
                output,
                "- {}: {} boards ({:.1}%)",
                bucket.range, bucket.count, bucket.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Reposts");
    if report.boards.is_empty() {
        let _ = writeln!(output, "No boards analysed.");
    }
    for board in &report.boards {
        let stats = &board.repost_stats;
        let _ = writeln!(
            output,
            "- {}: {:.1}% of {} postings reposted ({} repost events, avg gap {:.1} days, {} repeat offenders, {} to review) - {:?}",
            stats.board_name,
            stats.repost_percentage,
            stats.total_postings,
            stats.total_repost_events,
            stats.average_gap_between_reposts,
            stats.repeat_offenders,
            stats.needs_review,
            stats.severity
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lifespans");
    for board in &report.boards {
        let metrics = &board.lifespan;
        if metrics.closed_postings == 0 {
            let _ = writeln!(
                output,
                "- {}: no closed postings yet ({} active, avg age {} days)",
                metrics.board_name,
                metrics.active_postings,
                or_na(metrics.active_days_avg, 1)
            );
            continue;
        }
        let _ = writeln!(
            output,
            "- {}: avg {} days, median {}, p25 {}, p75 {} over {} closed ({} active)",
            metrics.board_name,
            or_na(metrics.summary.avg_lifespan, 1),
            or_na(metrics.summary.median_lifespan, 0),
            or_na(metrics.summary.p25_lifespan, 0),
            or_na(metrics.summary.p75_lifespan, 0),
            metrics.closed_postings,
            metrics.active_postings
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trends");
    for board in &report.boards {
        let trend = &board.trend;
        if trend.earliest_score.is_none() {
            let _ = writeln!(
                output,
                "- {}: not enough scored history ({} snapshots in {} days)",
                board.board.name, trend.data_points, trend.window_days
            );
            continue;
        }
        let _ = writeln!(
            output,
            "- {}: {} {:?} ({:+.2}%, {:+.1} points over {} days), week over week {} for {} weeks, volatility {}",
            board.board.name,
            trend.direction.arrow(),
            trend.strength,
            trend.score_change_percent,
            trend.score_change,
            trend.window_days,
            board.weekly.direction.arrow(),
            board.weekly.trend_duration,
            or_na(board.weekly.volatility, 2)
        );
    }

    let digest = &report.weekly_insights;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Insights");
    let _ = writeln!(output, "Week {} to {}", digest.period_start, digest.period_end);
    let _ = writeln!(output, "- Top: {}", listing(&digest.top_boards));
    let _ = writeln!(output, "- Bottom: {}", listing(&digest.bottom_boards));
    let _ = writeln!(output, "- Rising: {}", listing(&digest.rising_boards));
    let _ = writeln!(output, "- Declining: {}", listing(&digest.declining_boards));
    let volume = &digest.survey_volume;
    let _ = writeln!(
        output,
        "- Surveys: {} employer ({} this week), {} candidate ({} this week)",
        volume.total_employer, volume.weekly_employer, volume.total_candidate, volume.weekly_candidate
    );
    for insight in &digest.insights {
        let _ = writeln!(
            output,
            "- **{}**: {} {}",
            insight.title, insight.description, insight.recommendation
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Anomalies");
    let mut anomalies = report.anomalies().peekable();
    if anomalies.peek().is_none() {
        let _ = writeln!(output, "No anomalies detected.");
    }
    for alert in anomalies {
        let _ = writeln!(
            output,
            "- [{}] {}: {}",
            alert.severity.as_str(),
            alert.board_name,
            alert.description
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Role Families");
    if report.role_aggregates.is_empty() {
        let _ = writeln!(output, "No role data for this run.");
    }
    for role in &report.role_aggregates {
        let _ = writeln!(
            output,
            "- {}: avg {} (median {}) across {} boards, {} jobs, best {}, trend {}",
            role.role_family,
            or_na(role.avg_score, 1),
            or_na(role.median_score, 0),
            role.board_count,
            role.job_count,
            role.best_board.as_deref().unwrap_or("-"),
            role.trend.map(|t| t.arrow()).unwrap_or("-")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Industries");
    for industry in &report.industry_aggregates {
        let _ = writeln!(
            output,
            "- {} ({}): avg {} across {} boards, {} jobs, top board {}, top role {}",
            industry.industry,
            industry.description,
            or_na(industry.avg_score, 1),
            industry.board_count,
            industry.job_count,
            industry.top_board.as_deref().unwrap_or("-"),
            industry.top_role.as_deref().unwrap_or("-")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hiring Velocity");
    for velocity in &report.hiring_velocity {
        let _ = writeln!(
            output,
            "- {}: {:?} demand, {} new ({:.2}/day) of {} jobs",
            velocity.role_family,
            velocity.demand_level,
            velocity.new_jobs,
            velocity.new_jobs_per_day,
            velocity.job_count
        );
    }
    for trend in report.role_trends.iter().take(5) {
        let _ = writeln!(
            output,
            "- hot: {} ({} this week vs {} last week, hotness {:.0})",
            trend.role_family, trend.this_week, trend.last_week, trend.hotness
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    for recommendation in &report.recommendations {
        let boards: Vec<String> = recommendation
            .top_boards
            .iter()
            .map(|b| format!("{} ({})", b.board_name, b.overall_score))
            .collect();
        let _ = writeln!(
            output,
            "- {} Top boards: {}",
            recommendation.recommendation,
            if boards.is_empty() { "-".to_string() } else { boards.join(", ") }
        );
    }

    if !report.failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Failures");
        for failure in &report.failures {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                failure.board_name, failure.stage, failure.error
            );
        }
    }

    output
}
