//! Target catalog access
//!
//! [`CatalogApi`] is the transport seam: one call per remote endpoint,
//! returning the decoded body or the status that prevented decoding. The
//! retry and selection policies live above it in [`crate::search`] and
//! [`crate::organization`], so they run unchanged against the HTTP client
//! and against scripted test doubles.

pub mod http;
pub mod wire;

pub use http::YmgalApi;
pub use wire::{OrgEnvelope, SearchEnvelope, WebsiteField};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Catalog transport errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result of a call that reached the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    /// 200 with a decoded body
    Success(T),
    /// 401: the bearer credential was rejected
    Unauthorized,
    /// Any other status
    Failed { status: u16, body: String },
}

/// Query string of the game search endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub mode: &'static str,
    pub keyword: String,
    pub page_num: u32,
    pub page_size: u32,
    pub include_org: bool,
}

impl SearchQuery {
    /// First page of 20 list results, organizations included
    pub fn list(keyword: &str) -> Self {
        Self {
            mode: "list",
            keyword: keyword.to_string(),
            page_num: 1,
            page_size: 20,
            include_org: true,
        }
    }
}

/// Remote endpoints of the target catalog
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Search games by keyword
    async fn search_games(
        &self,
        query: &SearchQuery,
        token: &str,
    ) -> Result<ApiOutcome<SearchEnvelope>, CatalogError>;

    /// Fetch organization detail by id
    async fn organization(
        &self,
        org_id: &str,
        token: &str,
    ) -> Result<ApiOutcome<OrgEnvelope>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_wire_names() {
        let value = serde_json::to_value(SearchQuery::list("Clannad")).unwrap();
        assert_eq!(value["mode"], "list");
        assert_eq!(value["keyword"], "Clannad");
        assert_eq!(value["pageNum"], 1);
        assert_eq!(value["pageSize"], 20);
        assert_eq!(value["includeOrg"], true);
    }
}
