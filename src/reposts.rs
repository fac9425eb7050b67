//! Repost detection.
//!
//! Observations for one board are walked in `first_seen` order. Each posting is
//! offered to an ordered chain of [`MatchRule`]s; the first rule that accepts
//! the nearest qualifying earlier posting links the two, and linked postings
//! are chained into one [`RepostCluster`] rooted at the earliest observation.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::bands::{self, RepostSeverity};
use crate::config::MatchingConfig;
use crate::models::PostingObservation;
use crate::normalize::{normalize_text, normalize_url, role_family_or_classified, similarity};
use crate::stats::{mean, percentage, round_to};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Url,
    TitleCompany,
    Similarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub match_type: MatchType,
    pub score: f64,
    pub confirmed: bool,
}

/// Comparison view of an observation; fields are normalized once up front.
#[derive(Debug, Clone)]
pub struct NormalizedPosting {
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    pub role_family: String,
}

impl NormalizedPosting {
    pub fn from_observation(observation: &PostingObservation) -> Self {
        Self {
            url: normalize_url(&observation.url),
            title: normalize_text(&observation.title),
            company: normalize_text(&observation.company),
            role_family: role_family_or_classified(&observation.role_family, &observation.title),
        }
    }
}

pub trait MatchRule: Send + Sync {
    fn evaluate(&self, earlier: &NormalizedPosting, later: &NormalizedPosting) -> Option<MatchOutcome>;
}

pub struct UrlRule;

impl MatchRule for UrlRule {
    fn evaluate(&self, earlier: &NormalizedPosting, later: &NormalizedPosting) -> Option<MatchOutcome> {
        match (&earlier.url, &later.url) {
            (Some(a), Some(b)) if a == b => Some(MatchOutcome {
                match_type: MatchType::Url,
                score: 1.0,
                confirmed: true,
            }),
            _ => None,
        }
    }
}

pub struct TitleCompanyRule;

impl MatchRule for TitleCompanyRule {
    fn evaluate(&self, earlier: &NormalizedPosting, later: &NormalizedPosting) -> Option<MatchOutcome> {
        if earlier.title.is_empty() || earlier.company.is_empty() {
            return None;
        }
        if earlier.title == later.title && earlier.company == later.company {
            return Some(MatchOutcome {
                match_type: MatchType::TitleCompany,
                score: 1.0,
                confirmed: true,
            });
        }
        None
    }
}

pub struct SimilarityRule {
    pub threshold: f64,
    pub high_confidence: f64,
    pub company_threshold: f64,
}

impl SimilarityRule {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            high_confidence: config.high_confidence_threshold,
            company_threshold: config.company_similarity_threshold,
        }
    }
}

impl MatchRule for SimilarityRule {
    fn evaluate(&self, earlier: &NormalizedPosting, later: &NormalizedPosting) -> Option<MatchOutcome> {
        if earlier.company.is_empty() || later.company.is_empty() {
            return None;
        }
        if earlier.role_family != later.role_family {
            return None;
        }

        let score = similarity(&earlier.title, &later.title);
        if score < self.threshold {
            return None;
        }
        if similarity(&earlier.company, &later.company) < self.company_threshold {
            return None;
        }

        Some(MatchOutcome {
            match_type: MatchType::Similarity,
            score,
            confirmed: score >= self.high_confidence,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostingMatch {
    pub original_posting_id: Uuid,
    pub matched_posting_id: Uuid,
    pub repost_posting_id: Uuid,
    pub match_type: MatchType,
    pub match_score: f64,
    pub first_seen: DateTime<Utc>,
    pub repost_date: DateTime<Utc>,
    pub gap_days: i64,
    pub confirmed: bool,
}

impl PostingMatch {
    pub fn needs_review(&self) -> bool {
        !self.confirmed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginalPosting {
    pub posting_id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub company: String,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepostCluster {
    pub cluster_id: Uuid,
    pub original_posting: OriginalPosting,
    pub reposts: Vec<PostingMatch>,
    pub total_reposts: usize,
    pub repost_frequency: f64,
    pub average_gap_days: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepostStats {
    pub board_id: Uuid,
    pub board_name: String,
    /// Distinct postings: one per cluster, reposts folded into their original.
    pub total_postings: usize,
    pub total_observations: usize,
    pub postings_with_reposts: usize,
    pub total_repost_events: usize,
    pub repost_percentage: f64,
    pub average_reposts_per_posting: f64,
    pub average_gap_between_reposts: f64,
    pub max_reposts_for_single_posting: usize,
    pub repeat_offenders: usize,
    pub needs_review: usize,
    pub severity: RepostSeverity,
}

/// Whole days from `earlier` to `later`, partial days rounded up, never negative.
pub fn gap_days(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    let seconds = (later - earlier).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + 86_399) / 86_400
}

pub struct RepostDetector {
    rules: Vec<Box<dyn MatchRule>>,
    min_gap_days: i64,
}

impl RepostDetector {
    /// The standard chain: url, then title + company, then fuzzy similarity.
    pub fn new(config: &MatchingConfig) -> Self {
        Self::with_rules(
            vec![
                Box::new(UrlRule),
                Box::new(TitleCompanyRule),
                Box::new(SimilarityRule::from_config(config)),
            ],
            config.min_gap_days,
        )
    }

    pub fn with_rules(rules: Vec<Box<dyn MatchRule>>, min_gap_days: i64) -> Self {
        Self {
            rules,
            min_gap_days: min_gap_days.max(0),
        }
    }

    /// Clusters every observation of one board; unmatched postings come back as
    /// singleton clusters. Output is ordered by the original's `first_seen`.
    pub fn detect(&self, observations: &[PostingObservation]) -> Vec<RepostCluster> {
        let mut ordered: Vec<&PostingObservation> = observations.iter().collect();
        ordered.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.posting_id.cmp(&b.posting_id))
        });
        let normalized: Vec<NormalizedPosting> = ordered
            .iter()
            .map(|o| NormalizedPosting::from_observation(o))
            .collect();

        let mut root: Vec<usize> = (0..ordered.len()).collect();
        let mut links: Vec<Option<(usize, MatchOutcome)>> = vec![None; ordered.len()];

        for later in 0..ordered.len() {
            if let Some((earlier, outcome)) = self.find_match(&ordered, &normalized, later) {
                root[later] = root[earlier];
                links[later] = Some((earlier, outcome));
                debug!(
                    posting = %ordered[later].posting_id,
                    matched = %ordered[earlier].posting_id,
                    match_type = ?outcome.match_type,
                    score = outcome.score,
                    "repost matched"
                );
            }
        }

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, cluster_root) in root.iter().enumerate() {
            members.entry(*cluster_root).or_default().push(index);
        }

        members
            .into_iter()
            .map(|(cluster_root, indexes)| {
                let original = ordered[cluster_root];
                let mut reposts = Vec::with_capacity(indexes.len().saturating_sub(1));
                for pair in indexes.windows(2) {
                    let previous = ordered[pair[0]];
                    let current = ordered[pair[1]];
                    if let Some((matched, outcome)) = links[pair[1]] {
                        reposts.push(PostingMatch {
                            original_posting_id: original.posting_id,
                            matched_posting_id: ordered[matched].posting_id,
                            repost_posting_id: current.posting_id,
                            match_type: outcome.match_type,
                            match_score: outcome.score,
                            first_seen: previous.first_seen,
                            repost_date: current.first_seen,
                            gap_days: gap_days(previous.first_seen, current.first_seen),
                            confirmed: outcome.confirmed,
                        });
                    }
                }
                build_cluster(original, reposts)
            })
            .collect()
    }

    fn find_match(
        &self,
        ordered: &[&PostingObservation],
        normalized: &[NormalizedPosting],
        later: usize,
    ) -> Option<(usize, MatchOutcome)> {
        let later_seen = ordered[later].first_seen;
        for rule in &self.rules {
            for earlier in (0..later).rev() {
                if gap_days(ordered[earlier].first_seen, later_seen) < self.min_gap_days {
                    continue;
                }
                if let Some(outcome) = rule.evaluate(&normalized[earlier], &normalized[later]) {
                    return Some((earlier, outcome));
                }
            }
        }
        None
    }
}

fn build_cluster(original: &PostingObservation, reposts: Vec<PostingMatch>) -> RepostCluster {
    let total_reposts = reposts.len();
    let gaps: Vec<f64> = reposts.iter().map(|m| m.gap_days as f64).collect();
    let average_gap_days = mean(&gaps).map(|v| round_to(v, 1)).unwrap_or(0.0);
    let span_days = reposts
        .last()
        .map(|last| gap_days(original.first_seen, last.repost_date))
        .unwrap_or(0);
    let repost_frequency = if span_days > 0 {
        round_to(total_reposts as f64 / span_days as f64 * 30.0, 2)
    } else {
        0.0
    };

    RepostCluster {
        cluster_id: original.posting_id,
        original_posting: OriginalPosting {
            posting_id: original.posting_id,
            board_id: original.board_id,
            title: original.title.clone(),
            company: original.company.clone(),
            first_seen: original.first_seen,
        },
        reposts,
        total_reposts,
        repost_frequency,
        average_gap_days,
    }
}

pub fn repost_stats(board_id: Uuid, board_name: &str, clusters: &[RepostCluster]) -> RepostStats {
    let total_postings = clusters.len();
    let with_reposts: Vec<&RepostCluster> = clusters.iter().filter(|c| c.total_reposts > 0).collect();
    let postings_with_reposts = with_reposts.len();
    let total_repost_events: usize = clusters.iter().map(|c| c.total_reposts).sum();
    let repost_percentage = round_to(percentage(postings_with_reposts, total_postings), 1);
    let average_reposts_per_posting = if total_postings == 0 {
        0.0
    } else {
        round_to(total_repost_events as f64 / total_postings as f64, 2)
    };
    let cluster_gaps: Vec<f64> = with_reposts.iter().map(|c| c.average_gap_days).collect();

    RepostStats {
        board_id,
        board_name: board_name.to_string(),
        total_postings,
        total_observations: total_postings + total_repost_events,
        postings_with_reposts,
        total_repost_events,
        repost_percentage,
        average_reposts_per_posting,
        average_gap_between_reposts: mean(&cluster_gaps).map(|v| round_to(v, 1)).unwrap_or(0.0),
        max_reposts_for_single_posting: clusters.iter().map(|c| c.total_reposts).max().unwrap_or(0),
        repeat_offenders: clusters.iter().filter(|c| c.total_reposts >= 3).count(),
        needs_review: clusters
            .iter()
            .flat_map(|c| c.reposts.iter())
            .filter(|m| m.needs_review())
            .count(),
        severity: bands::quality_band(repost_percentage).severity,
    }
}

/// Ids of every posting judged to be a repost of an earlier one.
pub fn reposted_posting_ids(clusters: &[RepostCluster]) -> HashSet<Uuid> {
    clusters
        .iter()
        .flat_map(|c| c.reposts.iter().map(|m| m.repost_posting_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn observation(title: &str, company: &str, url: &str, role: &str, day: i64) -> PostingObservation {
        PostingObservation {
            posting_id: Uuid::new_v4(),
            board_id: Uuid::nil(),
            title: title.to_string(),
            company: company.to_string(),
            url: url.to_string(),
            role_family: role.to_string(),
            first_seen: base() + Duration::days(day),
        }
    }

    fn detector() -> RepostDetector {
        RepostDetector::new(&MatchingConfig::default())
    }

    #[test]
    fn unmatched_postings_are_singletons() {
        let postings = vec![
            observation("Rust Engineer", "Ferrous", "https://a.test/1", "software-engineer", 0),
            observation("Accountant", "Ledger Co", "https://a.test/2", "finance", 3),
        ];
        let clusters = detector().detect(&postings);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.total_reposts == 0 && c.reposts.is_empty()));
    }

    #[test]
    fn url_match_takes_precedence() {
        let postings = vec![
            observation("Rust Engineer", "Ferrous", "https://a.test/job/1?utm_source=x", "software-engineer", 0),
            observation("Completely Different", "Other", "https://A.test/job/1/", "sales", 5),
        ];
        let clusters = detector().detect(&postings);
        assert_eq!(clusters.len(), 1);
        let repost = &clusters[0].reposts[0];
        assert_eq!(repost.match_type, MatchType::Url);
        assert_eq!(repost.match_score, 1.0);
        assert!(repost.confirmed);
        assert_eq!(repost.gap_days, 5);
    }

    #[test]
    fn title_company_match_is_confirmed() {
        let postings = vec![
            observation("Data Scientist", "Acme", "https://a.test/1", "data-scientist", 0),
            observation("Data  Scientist!", "ACME", "https://a.test/2", "data-scientist", 9),
        ];
        let clusters = detector().detect(&postings);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].reposts[0].match_type, MatchType::TitleCompany);
        assert!(clusters[0].reposts[0].confirmed);
    }

    #[test]
    fn fuzzy_match_below_high_confidence_needs_review() {
        let postings = vec![
            observation("Senior Backend Engineer", "Acme Corp", "", "software-engineer", 0),
            observation("Senior Backend Engineer II", "Acme Corp.", "", "software-engineer", 4),
        ];
        let clusters = detector().detect(&postings);
        assert_eq!(clusters.len(), 1);
        let repost = &clusters[0].reposts[0];
        assert_eq!(repost.match_type, MatchType::Similarity);
        assert!(repost.match_score >= 0.75 && repost.match_score < 0.90);
        assert!(!repost.confirmed);
        assert!(repost.needs_review());
    }

    #[test]
    fn fuzzy_match_requires_same_role_family() {
        let postings = vec![
            observation("Senior Backend Engineer", "Acme", "", "software-engineer", 0),
            observation("Senior Backend Engineer II", "Acme", "", "devops-infrastructure", 4),
        ];
        assert_eq!(detector().detect(&postings).len(), 2);
    }

    #[test]
    fn chained_reposts_measure_consecutive_gaps() {
        let postings = vec![
            observation("Product Manager", "Acme", "https://a.test/pm", "product-manager", 0),
            observation("Product Manager", "Acme", "https://a.test/pm", "product-manager", 10),
            observation("Product Manager", "Acme", "https://a.test/pm", "product-manager", 25),
        ];
        let clusters = detector().detect(&postings);
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.total_reposts, 2);
        assert_eq!(cluster.reposts.len(), cluster.total_reposts);
        assert_eq!(cluster.reposts[0].gap_days, 10);
        assert_eq!(cluster.reposts[1].gap_days, 15);
        assert_eq!(cluster.reposts[1].matched_posting_id, cluster.reposts[0].repost_posting_id);
        assert!(cluster.reposts[0].repost_date <= cluster.reposts[1].repost_date);
        assert_eq!(cluster.average_gap_days, 12.5);
        assert_eq!(cluster.repost_frequency, 2.4);
        assert_eq!(cluster.original_posting.posting_id, postings[0].posting_id);
    }

    #[test]
    fn same_instant_duplicates_are_not_reposts() {
        let postings = vec![
            observation("Designer", "Studio", "https://a.test/d", "designer", 0),
            observation("Designer", "Studio", "https://a.test/d", "designer", 0),
        ];
        assert_eq!(detector().detect(&postings).len(), 2);
    }

    #[test]
    fn partial_days_round_up() {
        let start = base();
        assert_eq!(gap_days(start, start + Duration::hours(2)), 1);
        assert_eq!(gap_days(start, start + Duration::days(3)), 3);
        assert_eq!(gap_days(start + Duration::days(1), start), 0);
    }

    struct SameCompanyRule;

    impl MatchRule for SameCompanyRule {
        fn evaluate(&self, earlier: &NormalizedPosting, later: &NormalizedPosting) -> Option<MatchOutcome> {
            (earlier.company == later.company).then_some(MatchOutcome {
                match_type: MatchType::Similarity,
                score: 0.5,
                confirmed: false,
            })
        }
    }

    #[test]
    fn custom_rule_chain_plugs_in() {
        let detector = RepostDetector::with_rules(vec![Box::new(SameCompanyRule)], 1);
        let postings = vec![
            observation("Cook", "Diner", "", "other", 0),
            observation("Waiter", "Diner", "", "other", 2),
        ];
        let clusters = detector.detect(&postings);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].reposts[0].match_score, 0.5);
    }

    #[test]
    fn scenario_a_three_of_one_hundred() {
        let mut postings = Vec::new();
        for i in 0..100 {
            postings.push(observation(
                &format!("Role {i}"),
                &format!("Company {i}"),
                &format!("https://a.test/{i}"),
                &format!("family-{i}"),
                i % 20,
            ));
        }
        for i in 0..3 {
            postings.push(observation(
                &format!("Role {i}"),
                &format!("Company {i}"),
                &format!("https://a.test/{i}"),
                &format!("family-{i}"),
                40,
            ));
        }

        let clusters = detector().detect(&postings);
        let stats = repost_stats(Uuid::nil(), "Board", &clusters);
        assert_eq!(stats.total_postings, 100);
        assert_eq!(stats.total_observations, 103);
        assert_eq!(stats.postings_with_reposts, 3);
        assert_eq!(stats.total_repost_events, 3);
        assert_eq!(stats.repost_percentage, 3.0);
        assert_eq!(stats.severity, RepostSeverity::Excellent);
    }

    #[test]
    fn empty_board_has_zero_percentage() {
        let stats = repost_stats(Uuid::nil(), "Empty", &[]);
        assert_eq!(stats.repost_percentage, 0.0);
        assert_eq!(stats.average_reposts_per_posting, 0.0);
        assert_eq!(stats.max_reposts_for_single_posting, 0);
    }

    #[test]
    fn repeat_offenders_and_review_counts() {
        let mut postings = vec![observation("Sales Rep", "Acme", "https://a.test/s", "sales", 0)];
        for day in [7, 14, 21] {
            postings.push(observation("Sales Rep", "Acme", "https://a.test/s", "sales", day));
        }
        let clusters = detector().detect(&postings);
        let stats = repost_stats(Uuid::nil(), "Board", &clusters);
        assert_eq!(stats.total_postings, 1);
        assert_eq!(stats.max_reposts_for_single_posting, 3);
        assert_eq!(stats.repeat_offenders, 1);
        assert_eq!(stats.needs_review, 0);
        assert_eq!(stats.repost_percentage, 100.0);
        assert_eq!(stats.severity, RepostSeverity::Critical);
        assert_eq!(reposted_posting_ids(&clusters).len(), 3);
    }
}
