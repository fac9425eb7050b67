//! Shared banding tables.
//!
//! Grade labels, quality multipliers, repost severity and recommendation
//! language all come from the tables in this module. Scorer, aggregator and
//! report read the same rows, so a score, its grade and the sentence shown next
//! to it cannot disagree. Bump `TABLE_VERSION` whenever a boundary moves.

use std::fmt;

use serde::Serialize;

use crate::config::DemandThresholds;

pub const TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeTier {
    A,
    B,
    C,
    DF,
}

/// Ordered highest first; the first row whose floor the score reaches wins.
pub const GRADE_TABLE: [(f64, Grade); 9] = [
    (90.0, Grade::APlus),
    (85.0, Grade::A),
    (80.0, Grade::BPlus),
    (75.0, Grade::B),
    (70.0, Grade::BMinus),
    (60.0, Grade::CPlus),
    (50.0, Grade::C),
    (40.0, Grade::D),
    (f64::NEG_INFINITY, Grade::F),
];

impl Grade {
    pub fn for_score(score: f64) -> Grade {
        GRADE_TABLE
            .iter()
            .find(|(floor, _)| score >= *floor)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn tier(&self) -> GradeTier {
        match self {
            Grade::APlus | Grade::A => GradeTier::A,
            Grade::BPlus | Grade::B | Grade::BMinus => GradeTier::B,
            Grade::CPlus | Grade::C => GradeTier::C,
            Grade::D | Grade::F => GradeTier::DF,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Recommendation sentence for a role family at a given grade tier.
pub fn recommendation(role: &str, grade: Option<Grade>) -> String {
    match grade.map(|g| g.tier()) {
        Some(GradeTier::A) => format!(
            "{role} is well served: the top boards for this role are reliable and efficient."
        ),
        Some(GradeTier::B) => format!(
            "{role} is adequately served. Focus on the top 3 boards for the best hiring outcomes."
        ),
        Some(GradeTier::C) => format!(
            "{role} shows middling efficiency. Prefer the best-ranked board and watch repost rates."
        ),
        Some(GradeTier::DF) => format!(
            "{role} shows low efficiency. Diversify across boards and investigate data quality."
        ),
        None => format!("{role} has no reliably scored boards yet."),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepostSeverity {
    Excellent,
    Good,
    Moderate,
    Concerning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QualityBand {
    /// Upper bound of the band, in repost-rate percent.
    pub upper: f64,
    pub upper_inclusive: bool,
    pub multiplier: f64,
    pub severity: RepostSeverity,
    pub description: &'static str,
    pub recommendation: &'static str,
}

pub const QUALITY_BANDS: [QualityBand; 5] = [
    QualityBand {
        upper: 5.0,
        upper_inclusive: false,
        multiplier: 1.0,
        severity: RepostSeverity::Excellent,
        description: "Very low repost rate - strong data quality",
        recommendation: "Monitor for changes; keep current collection practices",
    },
    QualityBand {
        upper: 15.0,
        upper_inclusive: false,
        multiplier: 0.95,
        severity: RepostSeverity::Good,
        description: "Low repost rate - acceptable quality",
        recommendation: "Continue current approach; some duplication is expected",
    },
    QualityBand {
        upper: 30.0,
        upper_inclusive: false,
        multiplier: 0.85,
        severity: RepostSeverity::Moderate,
        description: "Moderate repost rate - notable duplication",
        recommendation: "Investigate collection frequency and adjust the strategy",
    },
    QualityBand {
        upper: 50.0,
        upper_inclusive: true,
        multiplier: 0.70,
        severity: RepostSeverity::Concerning,
        description: "High repost rate - significant duplication issues",
        recommendation: "Review collector configuration and deduplication rules",
    },
    QualityBand {
        upper: f64::INFINITY,
        upper_inclusive: true,
        multiplier: 0.0,
        severity: RepostSeverity::Critical,
        description: "Very high repost rate - data unreliable",
        recommendation: "Pause collection for this board and audit before resuming",
    },
];

pub fn quality_band(repost_rate: f64) -> &'static QualityBand {
    QUALITY_BANDS
        .iter()
        .find(|band| {
            if band.upper_inclusive {
                repost_rate <= band.upper
            } else {
                repost_rate < band.upper
            }
        })
        .unwrap_or(&QUALITY_BANDS[QUALITY_BANDS.len() - 1])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DemandLevel {
    High,
    Medium,
    Low,
}

pub fn demand_level(job_count: usize, new_per_day: f64, thresholds: &DemandThresholds) -> DemandLevel {
    if job_count > thresholds.high_job_count || new_per_day >= thresholds.high_new_per_day {
        DemandLevel::High
    } else if job_count > thresholds.medium_job_count || new_per_day >= thresholds.medium_new_per_day {
        DemandLevel::Medium
    } else {
        DemandLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_boundaries() {
        assert_eq!(Grade::for_score(100.0), Grade::APlus);
        assert_eq!(Grade::for_score(90.0), Grade::APlus);
        assert_eq!(Grade::for_score(89.0), Grade::A);
        assert_eq!(Grade::for_score(85.0), Grade::A);
        assert_eq!(Grade::for_score(84.0), Grade::BPlus);
        assert_eq!(Grade::for_score(75.0), Grade::B);
        assert_eq!(Grade::for_score(70.0), Grade::BMinus);
        assert_eq!(Grade::for_score(69.0), Grade::CPlus);
        assert_eq!(Grade::for_score(50.0), Grade::C);
        assert_eq!(Grade::for_score(49.0), Grade::D);
        assert_eq!(Grade::for_score(39.0), Grade::F);
        assert_eq!(Grade::for_score(0.0), Grade::F);
    }

    #[test]
    fn tiers_follow_score_bands() {
        for score in 0..=100 {
            let tier = Grade::for_score(score as f64).tier();
            let expected = match score {
                85..=100 => GradeTier::A,
                70..=84 => GradeTier::B,
                50..=69 => GradeTier::C,
                _ => GradeTier::DF,
            };
            assert_eq!(tier, expected, "score {score}");
        }
    }

    #[test]
    fn grade_table_is_strictly_descending() {
        for pair in GRADE_TABLE.windows(2) {
            assert!(pair[0].0 > pair[1].0);
        }
    }

    #[test]
    fn quality_multiplier_steps() {
        assert_eq!(quality_band(0.0).multiplier, 1.0);
        assert_eq!(quality_band(4.9).multiplier, 1.0);
        assert_eq!(quality_band(5.0).multiplier, 0.95);
        assert_eq!(quality_band(10.0).multiplier, 0.95);
        assert_eq!(quality_band(15.0).multiplier, 0.85);
        assert_eq!(quality_band(30.0).multiplier, 0.70);
        assert_eq!(quality_band(50.0).multiplier, 0.70);
        assert_eq!(quality_band(50.1).multiplier, 0.0);
        assert_eq!(quality_band(100.0).multiplier, 0.0);
    }

    #[test]
    fn quality_multiplier_never_increases() {
        let mut previous = f64::INFINITY;
        for tenth in 0..=1000 {
            let multiplier = quality_band(tenth as f64 / 10.0).multiplier;
            assert!(multiplier <= previous);
            previous = multiplier;
        }
    }

    #[test]
    fn severity_tracks_band() {
        assert_eq!(quality_band(2.0).severity, RepostSeverity::Excellent);
        assert_eq!(quality_band(40.0).severity, RepostSeverity::Concerning);
        assert_eq!(quality_band(75.0).severity, RepostSeverity::Critical);
    }

    #[test]
    fn recommendation_uses_grade_tier() {
        assert!(recommendation("designer", Some(Grade::A)).contains("well served"));
        assert!(recommendation("designer", Some(Grade::BMinus)).contains("top 3 boards"));
        assert!(recommendation("designer", Some(Grade::F)).contains("low efficiency"));
        assert!(recommendation("designer", None).contains("no reliably scored"));
    }

    #[test]
    fn demand_tiers_use_thresholds() {
        let thresholds = DemandThresholds::default();
        assert_eq!(demand_level(250, 0.0, &thresholds), DemandLevel::High);
        assert_eq!(demand_level(10, 6.0, &thresholds), DemandLevel::High);
        assert_eq!(demand_level(60, 0.0, &thresholds), DemandLevel::Medium);
        assert_eq!(demand_level(10, 0.2, &thresholds), DemandLevel::Low);
    }
}
