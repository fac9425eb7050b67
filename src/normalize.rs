//! Text and URL normalization used by repost matching and role grouping.

use strsim::normalized_levenshtein;
use url::Url;

const TRACKING_PARAMS: [&str; 6] = ["gclid", "fbclid", "ref", "source", "trk", "src"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonical form of a posting URL, or `None` when there is nothing to compare.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match Url::parse(trimmed) {
        Ok(mut parsed) => {
            let mut kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(key, _)| !is_tracking_param(key))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            kept.sort();

            parsed.set_fragment(None);
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed.query_pairs_mut().clear().extend_pairs(kept);
            }
            parsed.to_string()
        }
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let normalized = normalized.to_lowercase();
    let normalized = normalized.trim_end_matches('/');
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

/// Lowercase, alphanumerics only, single spaces.
pub fn normalize_text(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein ratio between two already-normalized strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b)
}

struct RoleFamilyRule {
    family: &'static str,
    keywords: &'static [&'static str],
    exclude: &'static [&'static str],
}

// Order matters: narrower families are checked before broad ones.
const ROLE_FAMILY_RULES: &[RoleFamilyRule] = &[
    RoleFamilyRule {
        family: "qa-testing",
        keywords: &["qa", "quality assurance", "test engineer", "tester", "sdet"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "data-scientist",
        keywords: &["data scientist", "machine learning", "ml engineer", "data analyst", "data engineer"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "product-manager",
        keywords: &["product manager", "product owner", "product lead"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "designer",
        keywords: &["designer", "ux", "ui", "user experience", "visual design"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "devops-infrastructure",
        keywords: &["devops", "sre", "site reliability", "infrastructure", "platform engineer", "cloud engineer"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "software-engineer",
        keywords: &[
            "software engineer",
            "developer",
            "programmer",
            "backend",
            "frontend",
            "back end",
            "front end",
            "full stack",
            "fullstack",
            "software architect",
        ],
        exclude: &["manager"],
    },
    RoleFamilyRule {
        family: "sales",
        keywords: &["sales", "account executive", "business development"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "marketing",
        keywords: &["marketing", "growth", "seo", "content strategist"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "finance",
        keywords: &["accountant", "finance", "financial", "controller"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "hr",
        keywords: &["recruiter", "human resources", "talent acquisition", "people partner"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "executive",
        keywords: &["chief", "vp", "vice president", "director", "head of"],
        exclude: &[],
    },
    RoleFamilyRule {
        family: "operations",
        keywords: &["operations", "logistics", "supply chain"],
        exclude: &[],
    },
];

/// Keyword classification of a title into a role family; `other` when nothing matches.
///
/// Keywords match whole words or whole phrases of the normalized title.
pub fn classify_role_family(title: &str) -> &'static str {
    let padded = format!(" {} ", normalize_text(title));
    let has = |phrase: &&str| padded.contains(&format!(" {phrase} "));
    ROLE_FAMILY_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(has) && !rule.exclude.iter().any(has))
        .map(|rule| rule.family)
        .unwrap_or("other")
}

/// The observation's role family when present, otherwise the classified one.
pub fn role_family_or_classified(role_family: &str, title: &str) -> String {
    let trimmed = role_family.trim();
    if trimmed.is_empty() {
        classify_role_family(title).to_string()
    } else {
        trimmed.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization_strips_tracking_and_slash() {
        assert_eq!(
            normalize_url("HTTPS://Jobs.Example.com/Posting/42/?utm_source=mail&gclid=x#apply").as_deref(),
            Some("https://jobs.example.com/posting/42")
        );
    }

    #[test]
    fn url_normalization_keeps_identifying_params_sorted() {
        assert_eq!(
            normalize_url("https://example.com/view?jk=abc&utm_medium=x&from=feed").as_deref(),
            Some("https://example.com/view?from=feed&jk=abc")
        );
    }

    #[test]
    fn unparsable_urls_fall_back_to_plain_trim() {
        assert_eq!(
            normalize_url("example.com/jobs/7/?ref=abc").as_deref(),
            Some("example.com/jobs/7")
        );
        assert_eq!(normalize_url("   "), None);
    }

    #[test]
    fn text_normalization_collapses_punctuation() {
        assert_eq!(normalize_text("  Senior  Rust-Engineer (Remote) "), "senior rust engineer remote");
        assert_eq!(normalize_text("ACME, Inc."), "acme inc");
    }

    #[test]
    fn similarity_is_symmetric_ratio() {
        let a = normalize_text("Senior Backend Engineer");
        let b = normalize_text("Senior Backend Engineer II");
        let score = similarity(&a, &b);
        assert!(score > 0.85 && score < 1.0);
        assert!((score - similarity(&b, &a)).abs() < 1e-12);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn classifies_common_titles() {
        assert_eq!(classify_role_family("Senior Software Engineer"), "software-engineer");
        assert_eq!(classify_role_family("QA Automation Engineer"), "qa-testing");
        assert_eq!(classify_role_family("Engineering Manager, Developer Tools"), "other");
        assert_eq!(classify_role_family("Product Manager"), "product-manager");
        assert_eq!(classify_role_family("Barista"), "other");
    }

    #[test]
    fn keywords_do_not_match_inside_words() {
        assert_eq!(classify_role_family("Luxury Sales Associate"), "sales");
        assert_eq!(classify_role_family("Aqua Park Lifeguard"), "other");
        assert_eq!(classify_role_family("Device Repair Technician"), "other");
        assert_eq!(classify_role_family("Handkerchief Buyer"), "other");
    }

    #[test]
    fn keywords_match_across_punctuation() {
        assert_eq!(classify_role_family("UX/UI Designer"), "designer");
        assert_eq!(classify_role_family("SRE (On-call)"), "devops-infrastructure");
        assert_eq!(classify_role_family("Front-End Engineer"), "software-engineer");
        assert_eq!(classify_role_family("VP, Engineering"), "executive");
    }

    #[test]
    fn explicit_role_family_wins() {
        assert_eq!(role_family_or_classified("Designer", "Backend Developer"), "designer");
        assert_eq!(role_family_or_classified("", "Backend Developer"), "software-engineer");
    }
}
