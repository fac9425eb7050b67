//! Engine configuration loaded from `board-intel.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock thresholds.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_CONFIG_FILE: &str = "board-intel.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub trends: TrendConfig,
    #[serde(default)]
    pub demand: DemandThresholds,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default = "default_industries")]
    pub industries: Vec<IndustryRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f64,
    #[serde(default = "default_company_similarity_threshold")]
    pub company_similarity_threshold: f64,
    #[serde(default = "default_min_gap_days")]
    pub min_gap_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_weekly_deadband")]
    pub weekly_deadband: f64,
    #[serde(default = "default_history_weeks")]
    pub history_weeks: usize,
    #[serde(default = "default_volatility_weeks")]
    pub volatility_weeks: usize,
    #[serde(default = "default_anomaly_baseline_days")]
    pub anomaly_baseline_days: i64,
    #[serde(default = "default_anomaly_min_history")]
    pub anomaly_min_history: usize,
    /// Week-over-week score change, in points, that counts as rising or declining.
    #[serde(default = "default_movement_points")]
    pub movement_points: f64,
}

/// Tier thresholds for `HiringVelocity::demand_level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandThresholds {
    #[serde(default = "default_high_job_count")]
    pub high_job_count: usize,
    #[serde(default = "default_medium_job_count")]
    pub medium_job_count: usize,
    #[serde(default = "default_high_new_per_day")]
    pub high_new_per_day: f64,
    #[serde(default = "default_medium_new_per_day")]
    pub medium_new_per_day: f64,
    #[serde(default = "default_velocity_window_days")]
    pub velocity_window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_persist")]
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_similarity_threshold() -> f64 {
    0.75
}

fn default_high_confidence_threshold() -> f64 {
    0.90
}

fn default_company_similarity_threshold() -> f64 {
    0.70
}

fn default_min_gap_days() -> i64 {
    1
}

fn default_window_days() -> i64 {
    30
}

fn default_weekly_deadband() -> f64 {
    1.0
}

fn default_history_weeks() -> usize {
    26
}

fn default_volatility_weeks() -> usize {
    8
}

fn default_anomaly_baseline_days() -> i64 {
    30
}

fn default_anomaly_min_history() -> usize {
    7
}

fn default_movement_points() -> f64 {
    5.0
}

fn default_high_job_count() -> usize {
    200
}

fn default_medium_job_count() -> usize {
    50
}

fn default_high_new_per_day() -> f64 {
    5.0
}

fn default_medium_new_per_day() -> f64 {
    1.0
}

fn default_velocity_window_days() -> i64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_persist() -> bool {
    true
}

fn industry(name: &str, description: &str, keywords: &[&str]) -> IndustryRule {
    IndustryRule {
        name: name.to_string(),
        description: description.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

fn default_industries() -> Vec<IndustryRule> {
    vec![
        industry(
            "Tech",
            "Technology and developer-focused job boards",
            &[
                "stack overflow",
                "github",
                "hacker news",
                "dice",
                "tech",
                "dev",
                "engineer",
            ],
        ),
        industry(
            "Remote",
            "Remote-first and distributed work boards",
            &[
                "we work remotely",
                "remote",
                "flexjobs",
                "distributed",
            ],
        ),
        industry(
            "Niche",
            "Specialized and niche job boards",
            &["idealist", "craigslist", "reddit", "niche", "specialist"],
        ),
        industry(
            "General",
            "General purpose job boards",
            &["linkedin", "indeed", "glassdoor", "monster"],
        ),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            trends: TrendConfig::default(),
            demand: DemandThresholds::default(),
            run: RunConfig::default(),
            industries: default_industries(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            high_confidence_threshold: default_high_confidence_threshold(),
            company_similarity_threshold: default_company_similarity_threshold(),
            min_gap_days: default_min_gap_days(),
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            weekly_deadband: default_weekly_deadband(),
            history_weeks: default_history_weeks(),
            volatility_weeks: default_volatility_weeks(),
            anomaly_baseline_days: default_anomaly_baseline_days(),
            anomaly_min_history: default_anomaly_min_history(),
            movement_points: default_movement_points(),
        }
    }
}

impl Default for DemandThresholds {
    fn default() -> Self {
        Self {
            high_job_count: default_high_job_count(),
            medium_job_count: default_medium_job_count(),
            high_new_per_day: default_high_new_per_day(),
            medium_new_per_day: default_medium_new_per_day(),
            velocity_window_days: default_velocity_window_days(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            persist: default_persist(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| {
            EngineError::ConfigRead {
                path: path.as_ref().to_path_buf(),
                source,
            }
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> EngineResult<Self> {
        let mut config: EngineConfig = toml::from_str(content)?;
        // An explicit empty list still falls back to the stock rules.
        if config.industries.is_empty() {
            config.industries = default_industries();
        }
        Ok(config)
    }

    /// Explicit path first, then `board-intel.toml` in the working directory,
    /// then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> EngineResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            return Self::from_file(&fallback);
        }

        Ok(Self::default())
    }

    /// Industry name and description for a board, by explicit value or keyword rule.
    pub fn industry_for(&self, board_name: &str, explicit: Option<&str>) -> (String, String) {
        if let Some(name) = explicit.filter(|value| !value.trim().is_empty()) {
            let description = self
                .industries
                .iter()
                .find(|rule| rule.name.eq_ignore_ascii_case(name))
                .map(|rule| rule.description.clone())
                .unwrap_or_default();
            return (name.to_string(), description);
        }

        let lowered = board_name.to_lowercase();
        self.industries
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| lowered.contains(&k.to_lowercase())))
            .map(|rule| (rule.name.clone(), rule.description.clone()))
            .unwrap_or_else(|| ("General".to_string(), "General purpose job boards".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.matching.similarity_threshold, 0.75);
        assert_eq!(config.trends.window_days, 30);
        assert_eq!(config.demand.high_job_count, 200);
        assert_eq!(config.run.workers, 4);
        assert!(!config.industries.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [matching]
            min_gap_days = 3

            [demand]
            high_job_count = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.matching.min_gap_days, 3);
        assert_eq!(config.matching.high_confidence_threshold, 0.90);
        assert_eq!(config.demand.high_job_count, 500);
        assert_eq!(config.demand.medium_job_count, 50);
    }

    #[test]
    fn industry_rules_match_board_names() {
        let config = EngineConfig::default();
        assert_eq!(config.industry_for("We Work Remotely", None).0, "Remote");
        assert_eq!(config.industry_for("Stack Overflow Jobs", None).0, "Tech");
        assert_eq!(config.industry_for("Bakery Board", None).0, "General");
        assert_eq!(config.industry_for("Anything", Some("Healthcare")).0, "Healthcare");
    }

    #[test]
    fn bundled_sample_matches_defaults() {
        let sample = EngineConfig::from_toml(include_str!("../board-intel.toml")).unwrap();
        let defaults = EngineConfig::default();
        assert_eq!(sample.matching.similarity_threshold, defaults.matching.similarity_threshold);
        assert_eq!(sample.trends.anomaly_min_history, defaults.trends.anomaly_min_history);
        assert_eq!(sample.trends.movement_points, defaults.trends.movement_points);
        assert_eq!(sample.demand.velocity_window_days, defaults.demand.velocity_window_days);
        assert_eq!(sample.run.workers, defaults.run.workers);
        let names = |c: &EngineConfig| c.industries.iter().map(|i| i.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&sample), names(&defaults));
        assert_eq!(sample.industries[0].keywords, defaults.industries[0].keywords);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(EngineConfig::from_toml("[matching\nmin_gap_days = ").is_err());
    }
}
