//! Posting lifespans from lifecycle events.
//!
//! A posting whose last event is `disappeared` has a closed lifespan spanning
//! its first appearance to that last disappearance, dormant windows included.
//! Anything else that has appeared is still active: its age is right-censored
//! and only feeds `active_days_avg`, never the closed distribution.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{EventType, PostingEvent, PostingObservation};
use crate::normalize::role_family_or_classified;
use crate::stats::{mean, median, percentage, percentile_nearest_rank, round_to, sorted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Lifespan {
    Closed { days: i64, cycles: usize },
    Active { age_days: i64, cycles: usize },
    Unobserved,
}

impl Lifespan {
    pub fn closed_days(&self) -> Option<i64> {
        match self {
            Lifespan::Closed { days, .. } => Some(*days),
            _ => None,
        }
    }

    pub fn active_age(&self) -> Option<i64> {
        match self {
            Lifespan::Active { age_days, .. } => Some(*age_days),
            _ => None,
        }
    }
}

pub fn posting_lifespan(events: &[PostingEvent], now: DateTime<Utc>) -> Lifespan {
    let mut ordered: Vec<&PostingEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.event_date);

    let first_appeared = ordered
        .iter()
        .find(|e| e.event_type == EventType::Appeared)
        .or_else(|| ordered.iter().find(|e| e.event_type == EventType::Reappeared))
        .map(|e| e.event_date);

    let Some(first_appeared) = first_appeared else {
        return Lifespan::Unobserved;
    };

    let cycles = ordered
        .iter()
        .filter(|e| e.event_type == EventType::Disappeared)
        .count();

    match ordered.last() {
        Some(last) if last.event_type == EventType::Disappeared => {
            let seconds = (last.event_date - first_appeared).num_seconds().max(0);
            Lifespan::Closed {
                days: (seconds + 86_399) / 86_400,
                cycles,
            }
        }
        _ => Lifespan::Active {
            age_days: (now - first_appeared).num_days().max(0),
            cycles,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostingLifespan {
    pub posting_id: Uuid,
    pub board_id: Uuid,
    pub board_name: String,
    pub role_family: String,
    pub lifespan: Lifespan,
}

/// Lifespan for every observation of a board; events are matched by posting id.
pub fn posting_lifespans(
    board_name: &str,
    observations: &[PostingObservation],
    events: &[PostingEvent],
    now: DateTime<Utc>,
) -> Vec<PostingLifespan> {
    let mut by_posting: HashMap<Uuid, Vec<PostingEvent>> = HashMap::new();
    for event in events {
        by_posting.entry(event.posting_id).or_default().push(event.clone());
    }

    observations
        .iter()
        .map(|observation| PostingLifespan {
            posting_id: observation.posting_id,
            board_id: observation.board_id,
            board_name: board_name.to_string(),
            role_family: role_family_or_classified(&observation.role_family, &observation.title),
            lifespan: by_posting
                .get(&observation.posting_id)
                .map(|events| posting_lifespan(events, now))
                .unwrap_or(Lifespan::Unobserved),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LifespanSummary {
    pub avg_lifespan: Option<f64>,
    pub median_lifespan: Option<f64>,
    pub p25_lifespan: Option<f64>,
    pub p75_lifespan: Option<f64>,
    pub min_lifespan: Option<f64>,
    pub max_lifespan: Option<f64>,
}

fn summarize(closed: &[f64]) -> LifespanSummary {
    let ordered = sorted(closed);
    LifespanSummary {
        avg_lifespan: mean(&ordered).map(|v| round_to(v, 1)),
        median_lifespan: median(&ordered),
        p25_lifespan: percentile_nearest_rank(&ordered, 25.0),
        p75_lifespan: percentile_nearest_rank(&ordered, 75.0),
        min_lifespan: ordered.first().copied(),
        max_lifespan: ordered.last().copied(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LifespanMetrics {
    pub board_id: Uuid,
    pub board_name: String,
    #[serde(flatten)]
    pub summary: LifespanSummary,
    pub total_postings: usize,
    pub closed_postings: usize,
    pub active_postings: usize,
    pub active_days_avg: Option<f64>,
}

pub fn lifespan_metrics(board_id: Uuid, board_name: &str, postings: &[PostingLifespan]) -> LifespanMetrics {
    let closed: Vec<f64> = postings
        .iter()
        .filter_map(|p| p.lifespan.closed_days())
        .map(|d| d as f64)
        .collect();
    let active: Vec<f64> = postings
        .iter()
        .filter_map(|p| p.lifespan.active_age())
        .map(|d| d as f64)
        .collect();

    LifespanMetrics {
        board_id,
        board_name: board_name.to_string(),
        summary: summarize(&closed),
        total_postings: closed.len() + active.len(),
        closed_postings: closed.len(),
        active_postings: active.len(),
        active_days_avg: mean(&active).map(|v| round_to(v, 1)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifespanBucket {
    pub range: &'static str,
    pub min_days: i64,
    pub max_days: Option<i64>,
    pub count: usize,
    pub percentage: f64,
}

const BUCKETS: [(&str, i64, Option<i64>); 5] = [
    ("0-7 days", 0, Some(7)),
    ("8-14 days", 8, Some(14)),
    ("15-30 days", 15, Some(30)),
    ("31-60 days", 31, Some(60)),
    ("60+ days", 61, None),
];

pub fn lifespan_distribution(postings: &[PostingLifespan]) -> Vec<LifespanBucket> {
    let closed: Vec<i64> = postings.iter().filter_map(|p| p.lifespan.closed_days()).collect();

    BUCKETS
        .iter()
        .map(|(range, min_days, max_days)| {
            let count = closed
                .iter()
                .filter(|days| **days >= *min_days && max_days.map_or(true, |max| **days <= max))
                .count();
            LifespanBucket {
                range: *range,
                min_days: *min_days,
                max_days: *max_days,
                count,
                percentage: round_to(percentage(count, closed.len()), 1),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleLifespan {
    pub role_family: String,
    #[serde(flatten)]
    pub summary: LifespanSummary,
    pub closed_postings: usize,
    pub active_postings: usize,
    pub distinct_boards: usize,
    pub most_common_board: Option<String>,
}

/// Cross-board breakdown by role family, longest average lifespan first.
pub fn role_lifespans(postings: &[PostingLifespan]) -> Vec<RoleLifespan> {
    let mut grouped: BTreeMap<&str, Vec<&PostingLifespan>> = BTreeMap::new();
    for posting in postings {
        if posting.lifespan == Lifespan::Unobserved {
            continue;
        }
        grouped.entry(posting.role_family.as_str()).or_default().push(posting);
    }

    let mut roles: Vec<RoleLifespan> = grouped
        .into_iter()
        .map(|(role, members)| {
            let closed: Vec<f64> = members
                .iter()
                .filter_map(|p| p.lifespan.closed_days())
                .map(|d| d as f64)
                .collect();
            let boards: HashSet<Uuid> = members.iter().map(|p| p.board_id).collect();

            let mut per_board: BTreeMap<&str, usize> = BTreeMap::new();
            for member in &members {
                *per_board.entry(member.board_name.as_str()).or_insert(0) += 1;
            }
            // BTreeMap order makes ties resolve to the alphabetically first board.
            let most_common_board = per_board
                .iter()
                .fold(None::<(&str, usize)>, |best, (name, count)| match best {
                    Some((_, best_count)) if best_count >= *count => best,
                    _ => Some((*name, *count)),
                })
                .map(|(name, _)| name.to_string());

            RoleLifespan {
                role_family: role.to_string(),
                summary: summarize(&closed),
                closed_postings: closed.len(),
                active_postings: members.len() - closed.len(),
                distinct_boards: boards.len(),
                most_common_board,
            }
        })
        .collect();

    roles.sort_by(|a, b| {
        let a_avg = a.summary.avg_lifespan.unwrap_or(-1.0);
        let b_avg = b.summary.avg_lifespan.unwrap_or(-1.0);
        b_avg
            .partial_cmp(&a_avg)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.role_family.cmp(&b.role_family))
    });
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::days(day)
    }

    fn event(posting_id: Uuid, event_type: EventType, day: i64) -> PostingEvent {
        PostingEvent {
            posting_id,
            event_type,
            event_date: at(day),
            notes: None,
        }
    }

    fn posting(board: &str, role: &str, lifespan: Lifespan) -> PostingLifespan {
        PostingLifespan {
            posting_id: Uuid::new_v4(),
            board_id: Uuid::from_u128(board.bytes().map(u128::from).sum()),
            board_name: board.to_string(),
            role_family: role.to_string(),
            lifespan,
        }
    }

    fn closed(days: i64) -> Lifespan {
        Lifespan::Closed { days, cycles: 1 }
    }

    #[test]
    fn closed_lifespan_spans_first_appearance_to_last_disappearance() {
        let id = Uuid::new_v4();
        let events = vec![
            event(id, EventType::Appeared, 0),
            event(id, EventType::Disappeared, 10),
            event(id, EventType::Reappeared, 15),
            event(id, EventType::Disappeared, 20),
        ];
        assert_eq!(
            posting_lifespan(&events, at(40)),
            Lifespan::Closed { days: 20, cycles: 2 }
        );
    }

    #[test]
    fn reappeared_posting_is_active_and_censored() {
        let id = Uuid::new_v4();
        let events = vec![
            event(id, EventType::Appeared, 0),
            event(id, EventType::Disappeared, 10),
            event(id, EventType::Reappeared, 12),
        ];
        assert_eq!(
            posting_lifespan(&events, at(30)),
            Lifespan::Active { age_days: 30, cycles: 1 }
        );
    }

    #[test]
    fn out_of_order_events_are_sorted() {
        let id = Uuid::new_v4();
        let events = vec![event(id, EventType::Disappeared, 9), event(id, EventType::Appeared, 2)];
        assert_eq!(posting_lifespan(&events, at(30)).closed_days(), Some(7));
    }

    #[test]
    fn no_appearance_is_unobserved() {
        let id = Uuid::new_v4();
        assert_eq!(posting_lifespan(&[], at(0)), Lifespan::Unobserved);
        assert_eq!(
            posting_lifespan(&[event(id, EventType::Disappeared, 3)], at(5)),
            Lifespan::Unobserved
        );
    }

    #[test]
    fn lifespans_are_never_negative() {
        let id = Uuid::new_v4();
        let events = vec![event(id, EventType::Appeared, 5)];
        assert_eq!(posting_lifespan(&events, at(1)).active_age(), Some(0));
    }

    #[test]
    fn metrics_exclude_active_postings_from_distribution() {
        let postings = vec![
            posting("Board", "designer", closed(4)),
            posting("Board", "designer", closed(10)),
            posting("Board", "designer", closed(20)),
            posting("Board", "designer", closed(30)),
            posting("Board", "designer", Lifespan::Active { age_days: 200, cycles: 0 }),
            posting("Board", "designer", Lifespan::Unobserved),
        ];
        let metrics = lifespan_metrics(Uuid::nil(), "Board", &postings);
        assert_eq!(metrics.closed_postings, 4);
        assert_eq!(metrics.active_postings, 1);
        assert_eq!(metrics.total_postings, 5);
        assert_eq!(metrics.summary.avg_lifespan, Some(16.0));
        assert_eq!(metrics.summary.p25_lifespan, Some(4.0));
        assert_eq!(metrics.summary.median_lifespan, Some(10.0));
        assert_eq!(metrics.summary.p75_lifespan, Some(20.0));
        assert_eq!(metrics.summary.min_lifespan, Some(4.0));
        assert_eq!(metrics.summary.max_lifespan, Some(30.0));
        assert_eq!(metrics.active_days_avg, Some(200.0));
    }

    #[test]
    fn empty_board_metrics_are_explicitly_empty() {
        let metrics = lifespan_metrics(Uuid::nil(), "Empty", &[]);
        assert_eq!(metrics.summary, LifespanSummary::default());
        assert_eq!(metrics.total_postings, 0);
        assert_eq!(metrics.active_days_avg, None);
    }

    #[test]
    fn distribution_buckets_cover_boundaries() {
        let postings: Vec<PostingLifespan> = [0, 7, 8, 14, 15, 30, 31, 60, 61, 400]
            .into_iter()
            .map(|d| posting("Board", "sales", closed(d)))
            .collect();
        let buckets = lifespan_distribution(&postings);
        assert_eq!(buckets.len(), 5);
        assert!(buckets.iter().all(|b| b.count == 2));
        assert!(buckets.iter().all(|b| b.percentage == 20.0));
    }

    #[test]
    fn distribution_without_closed_postings_is_zeroed() {
        let buckets = lifespan_distribution(&[posting("Board", "sales", Lifespan::Active { age_days: 3, cycles: 0 })]);
        assert_eq!(buckets.len(), 5);
        assert!(buckets.iter().all(|b| b.count == 0 && b.percentage == 0.0));
    }

    #[test]
    fn role_breakdown_counts_distinct_boards() {
        let postings = vec![
            posting("Alpha", "designer", closed(10)),
            posting("Alpha", "designer", closed(20)),
            posting("Beta", "designer", closed(30)),
            posting("Beta", "sales", closed(2)),
        ];
        let roles = role_lifespans(&postings);
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].role_family, "designer");
        assert_eq!(roles[0].distinct_boards, 2);
        assert_eq!(roles[0].closed_postings, 3);
        assert_eq!(roles[0].summary.avg_lifespan, Some(20.0));
        assert_eq!(roles[0].most_common_board.as_deref(), Some("Alpha"));
        assert_eq!(roles[1].distinct_boards, 1);
    }

    #[test]
    fn observations_without_events_are_unobserved() {
        let observation = PostingObservation {
            posting_id: Uuid::new_v4(),
            board_id: Uuid::nil(),
            title: "Backend Developer".to_string(),
            company: "Acme".to_string(),
            url: String::new(),
            role_family: String::new(),
            first_seen: at(0),
        };
        let lifespans = posting_lifespans("Board", &[observation], &[], at(3));
        assert_eq!(lifespans[0].lifespan, Lifespan::Unobserved);
        assert_eq!(lifespans[0].role_family, "software-engineer");
    }
}
