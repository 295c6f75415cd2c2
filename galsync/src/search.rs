//! Catalog search client
//!
//! Wraps [`CatalogApi::search_games`] with the credential refresh cycle and
//! the candidate policy:
//! - results are sorted by score, highest first
//! - a top score at or above the threshold is treated as certain and only
//!   that candidate is returned
//! - otherwise the best `top_k` are returned
//!
//! Every failure mode (exhausted refreshes, failed refresh, non-200 status,
//! transport or decode error) yields an empty list; none aborts the run.

use crate::catalog::{ApiOutcome, CatalogApi, SearchQuery};
use crate::credential::Credentials;
use crate::models::CandidateMatch;
use crate::retry::RetryBudget;
use std::sync::Arc;

/// Candidate selection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub threshold: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            threshold: 0.8,
        }
    }
}

/// Search client with 401 refresh-and-retry
pub struct SearchClient {
    api: Arc<dyn CatalogApi>,
    auth_budget: RetryBudget,
}

impl SearchClient {
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self::with_budget(api, RetryBudget::SEARCH_AUTH)
    }

    pub fn with_budget(api: Arc<dyn CatalogApi>, auth_budget: RetryBudget) -> Self {
        Self { api, auth_budget }
    }

    /// Search `keyword`, returning candidates best first (possibly none)
    pub async fn search(
        &self,
        keyword: &str,
        credentials: &mut Credentials,
        options: SearchOptions,
    ) -> Vec<CandidateMatch> {
        let query = SearchQuery::list(keyword);

        for attempt in self.auth_budget.attempts() {
            let outcome = match self.api.search_games(&query, credentials.token()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(keyword = %keyword, error = %e, "Search request failed");
                    return Vec::new();
                }
            };

            match outcome {
                ApiOutcome::Success(envelope) => {
                    let candidates: Vec<CandidateMatch> = envelope
                        .into_items()
                        .into_iter()
                        .map(CandidateMatch::from)
                        .collect();
                    tracing::debug!(
                        keyword = %keyword,
                        results = candidates.len(),
                        "Search succeeded"
                    );
                    return select_candidates(candidates, options);
                }
                ApiOutcome::Unauthorized => {
                    tracing::warn!(keyword = %keyword, attempt, "Search unauthorized");
                    if credentials.refresh().await.is_err() {
                        return Vec::new();
                    }
                    if self.auth_budget.is_last(attempt) {
                        tracing::warn!(
                            keyword = %keyword,
                            attempts = attempt,
                            "Search still unauthorized after all attempts"
                        );
                    }
                }
                ApiOutcome::Failed { status, body } => {
                    tracing::warn!(keyword = %keyword, status, body = %body, "Search failed");
                    return Vec::new();
                }
            }
        }

        Vec::new()
    }
}

/// Sort best first and apply the threshold short-circuit or top-k cut
///
/// The sort is stable, so equal scores keep the catalog's order.
pub fn select_candidates(
    mut candidates: Vec<CandidateMatch>,
    options: SearchOptions,
) -> Vec<CandidateMatch> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let certain = candidates
        .first()
        .map_or(false, |top| top.score >= options.threshold);

    if certain {
        candidates.truncate(1);
    } else {
        candidates.truncate(options.top_k);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, score: f64) -> CandidateMatch {
        CandidateMatch {
            name: name.to_string(),
            score,
            ..Default::default()
        }
    }

    fn names(candidates: &[CandidateMatch]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_threshold_exactly_met_returns_single() {
        let selected = select_candidates(
            vec![candidate("b", 0.5), candidate("a", 0.8), candidate("c", 0.7)],
            SearchOptions::default(),
        );
        assert_eq!(names(&selected), vec!["a"]);
    }

    #[test]
    fn test_below_threshold_returns_top_k_sorted() {
        let selected = select_candidates(
            vec![
                candidate("d", 0.1),
                candidate("b", 0.6),
                candidate("a", 0.79),
                candidate("c", 0.3),
            ],
            SearchOptions::default(),
        );
        assert_eq!(names(&selected), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_scores_keep_catalog_order() {
        let selected = select_candidates(
            vec![candidate("first", 0.5), candidate("second", 0.5)],
            SearchOptions::default(),
        );
        assert_eq!(names(&selected), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(select_candidates(Vec::new(), SearchOptions::default()).is_empty());
    }
}
