//! Best-match selection across a record's two names
//!
//! Names are searched in the fixed order A then B. The running best is only
//! replaced by a strictly higher top score, so variant A wins ties.

use crate::credential::Credentials;
use crate::models::{CandidateMatch, NameVariant};
use crate::search::{SearchClient, SearchOptions};

/// Winning candidate and the name that found it
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub candidate: CandidateMatch,
    pub field: NameVariant,
}

pub struct MatchSelector {
    search: SearchClient,
    options: SearchOptions,
}

impl MatchSelector {
    pub fn new(search: SearchClient, options: SearchOptions) -> Self {
        Self { search, options }
    }

    /// Search every non-empty name and keep the highest-scoring top candidate
    pub async fn select_best(
        &self,
        name_a: &str,
        name_b: &str,
        credentials: &mut Credentials,
    ) -> Option<BestMatch> {
        let mut best: Option<BestMatch> = None;

        for (field, name) in [(NameVariant::A, name_a), (NameVariant::B, name_b)] {
            if name.is_empty() {
                continue;
            }

            let top = self
                .search
                .search(name, credentials, self.options)
                .await
                .into_iter()
                .next();

            if let Some(candidate) = top {
                let better = best
                    .as_ref()
                    .map_or(true, |b| candidate.score > b.candidate.score);
                if better {
                    best = Some(BestMatch { candidate, field });
                }
            }
        }

        best
    }
}
