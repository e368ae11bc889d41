//! Search expression composition.
//!
//! A query is built from fixed-order token groups:
//!
//! ```text
//! ("human trafficking" OR ...) AND ("arrest" OR ...) AND ("news" OR "article") AND "South Africa"
//!     after:2025-03-03 before:2025-03-11 -site:youtube.com
//! ```
//!
//! The same inputs always produce the same string.

use crate::config::SearchConfig;
use crate::error::MinerError;
use crate::models::{DateWindow, QueryExpression};
use crate::terms::TermSets;
use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{debug, instrument};

/// Compose the search expression for one run.
///
/// `today` is the last day of the window; the window starts
/// `config.days_back` days earlier.
///
/// # Errors
///
/// [`MinerError::Configuration`] when the trafficking catalog is empty, the
/// evidence catalog is empty while evidence terms are enabled, the geography
/// is blank, or the window cannot be represented.
#[instrument(level = "debug", skip_all, fields(id = %config.id, days_back = config.days_back))]
pub fn build(
    config: &SearchConfig,
    terms: &TermSets,
    geography: &str,
    today: NaiveDate,
) -> Result<QueryExpression, MinerError> {
    let window = DateWindow::trailing(today, config.days_back)?;

    let trafficking = or_group(&terms.trafficking)
        .ok_or_else(|| MinerError::config("no trafficking terms configured"))?;
    let mut groups = vec![trafficking];

    if config.include_evidence_terms {
        let evidence = or_group(&terms.evidence)
            .ok_or_else(|| MinerError::config("no evidence terms configured"))?;
        groups.push(evidence);
        if let Some(news) = or_group(&terms.news_context) {
            groups.push(news);
        }
    }

    let geography = quote(geography)
        .ok_or_else(|| MinerError::config("geography must not be blank"))?;
    groups.push(geography);

    let mut tokens = vec![
        groups.join(" AND "),
        format!("after:{}", window.start_date().format("%Y-%m-%d")),
        format!("before:{}", window.before_bound().format("%Y-%m-%d")),
    ];
    tokens.extend(
        config
            .excluded_domains
            .iter()
            .map(|d| d.to_lowercase())
            .unique()
            .map(|d| format!("-site:{d}")),
    );

    let expression = tokens.join(" ");
    debug!(query = %expression, "Constructed query");
    Ok(QueryExpression::new(expression))
}

/// Render `terms` as `("a" OR "b")`, or `None` when nothing usable remains.
fn or_group(terms: &[String]) -> Option<String> {
    let quoted = terms.iter().filter_map(|t| quote(t)).collect::<Vec<_>>();
    if quoted.is_empty() {
        None
    } else {
        Some(format!("({})", quoted.join(" OR ")))
    }
}

/// Wrap a phrase in double quotes for exact matching.
///
/// Whitespace runs collapse to one space and embedded quotes are dropped,
/// since the search grammar has no way to escape them.
fn quote(term: &str) -> Option<String> {
    let cleaned = term
        .split_whitespace()
        .map(|word| word.replace('"', ""))
        .filter(|word| !word.is_empty())
        .join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("\"{cleaned}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn config(days_back: u32, excluded: &[&str]) -> SearchConfig {
        SearchConfig {
            id: "test".to_string(),
            days_back,
            excluded_domains: excluded.iter().map(|d| d.to_string()).collect(),
            include_evidence_terms: true,
            max_results: 10,
        }
    }

    fn small_terms() -> TermSets {
        TermSets {
            trafficking: vec!["human trafficking".into(), "forced labor".into()],
            evidence: vec!["arrest".into(), "victim".into()],
            news_context: vec!["news".into()],
        }
    }

    #[test]
    fn test_full_expression_layout() {
        let query = build(&config(7, &["spam.com"]), &small_terms(), "South Africa", today()).unwrap();
        assert_eq!(
            query.as_str(),
            r#"("human trafficking" OR "forced labor") AND ("arrest" OR "victim") AND ("news") AND "South Africa" after:2025-03-03 before:2025-03-11 -site:spam.com"#
        );
    }

    #[test]
    fn test_is_deterministic() {
        let cfg = config(3, &["a.com", "b.org"]);
        let terms = TermSets::default();
        let first = build(&cfg, &terms, "South Africa", today()).unwrap();
        let second = build(&cfg, &terms, "South Africa", today()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_date_tokens_cover_whole_window() {
        for d in [0u32, 1, 7, 30, 365] {
            let query = build(&config(d, &[]), &small_terms(), "South Africa", today()).unwrap();
            let after = today() - chrono::Days::new(u64::from(d));
            assert!(query.as_str().contains(&format!("after:{after}")));
            assert!(query.as_str().contains("before:2025-03-11"));
        }
    }

    #[test]
    fn test_excluded_domains_deduplicated_case_insensitively() {
        let query = build(
            &config(1, &["Spam.com", "spam.com", "other.net"]),
            &small_terms(),
            "South Africa",
            today(),
        )
        .unwrap();
        assert_eq!(query.as_str().matches("-site:spam.com").count(), 1);
        assert!(query.as_str().ends_with("-site:spam.com -site:other.net"));
    }

    #[test]
    fn test_empty_trafficking_terms_fail() {
        let mut terms = small_terms();
        terms.trafficking = vec!["   ".into()];
        let result = build(&config(1, &[]), &terms, "South Africa", today());
        assert!(matches!(result, Err(MinerError::Configuration(_))));
    }

    #[test]
    fn test_empty_evidence_terms_fail_only_when_enabled() {
        let mut terms = small_terms();
        terms.evidence.clear();
        assert!(build(&config(1, &[]), &terms, "South Africa", today()).is_err());

        let mut cfg = config(1, &[]);
        cfg.include_evidence_terms = false;
        let query = build(&cfg, &terms, "South Africa", today()).unwrap();
        assert!(query.as_str().starts_with(r#"("human trafficking" OR "forced labor") AND "South Africa" after:"#));
        assert!(!query.as_str().contains("news"));
    }

    #[test]
    fn test_blank_geography_fails() {
        assert!(build(&config(1, &[]), &small_terms(), "  ", today()).is_err());
    }

    #[test]
    fn test_empty_news_context_is_omitted() {
        let mut terms = small_terms();
        terms.news_context.clear();
        let query = build(&config(1, &[]), &terms, "Kenya", today()).unwrap();
        assert!(query.as_str().contains(r#"("arrest" OR "victim") AND "Kenya""#));
    }

    #[test]
    fn test_terms_are_quoted_and_cleaned() {
        assert_eq!(quote("  human \t trafficking "), Some("\"human trafficking\"".to_string()));
        assert_eq!(quote("say \"no\" now"), Some("\"say no now\"".to_string()));
        assert_eq!(quote("\"\""), None);
    }
}
