//! Built-in term catalogs used to compose search queries.
//!
//! Every catalog is an ordered list of phrases. Order is part of the query's
//! identity: the same catalogs always render the same expression.

/// Phrases describing the crimes we are looking for.
pub const TRAFFICKING_TERMS: &[&str] = &[
    "human trafficking",
    "cyber trafficking",
    "child trafficking",
    "forced labor",
    "sexual exploitation",
    "organ trafficking",
];

/// Words that suggest an article reports an actual incident.
pub const EVIDENCE_TERMS: &[&str] = &[
    "arrest",
    "suspect",
    "victim",
    "rescue",
    "operation",
    "investigation",
    "prosecute",
    "charged",
    "convicted",
];

/// Keywords steering results towards news coverage.
pub const NEWS_CONTEXT_TERMS: &[&str] = &["news", "article"];

/// The three catalogs a query is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermSets {
    pub trafficking: Vec<String>,
    pub evidence: Vec<String>,
    pub news_context: Vec<String>,
}

impl Default for TermSets {
    fn default() -> Self {
        Self {
            trafficking: owned(TRAFFICKING_TERMS),
            evidence: owned(EVIDENCE_TERMS),
            news_context: owned(NEWS_CONTEXT_TERMS),
        }
    }
}

impl TermSets {
    /// Replace any catalog that has an override; keep the rest.
    pub fn with_overrides(
        self,
        trafficking: Option<&[String]>,
        evidence: Option<&[String]>,
        news_context: Option<&[String]>,
    ) -> Self {
        Self {
            trafficking: trafficking.map(<[String]>::to_vec).unwrap_or(self.trafficking),
            evidence: evidence.map(<[String]>::to_vec).unwrap_or(self.evidence),
            news_context: news_context.map(<[String]>::to_vec).unwrap_or(self.news_context),
        }
    }
}

fn owned(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}
