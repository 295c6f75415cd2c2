//! HTTP client for the YMGal open archive API

use super::{ApiOutcome, CatalogApi, CatalogError, OrgEnvelope, SearchEnvelope, SearchQuery};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.ymgal.games";
const SEARCH_PATH: &str = "/open/archive/search-game";
const ARCHIVE_PATH: &str = "/open/archive";
const USER_AGENT: &str = concat!("galsync/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "1";

/// Build the shared reqwest client with the fixed per-request timeout
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, CatalogError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| CatalogError::NetworkError(e.to_string()))
}

/// YMGal catalog over HTTP
pub struct YmgalApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl YmgalApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("version", API_VERSION)
    }

    async fn into_outcome<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiOutcome<T>, CatalogError> {
        let status = response.status();

        if status == StatusCode::OK {
            let body = response
                .json::<T>()
                .await
                .map_err(|e| CatalogError::ParseError(e.to_string()))?;
            return Ok(ApiOutcome::Success(body));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Ok(ApiOutcome::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        Ok(ApiOutcome::Failed {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CatalogApi for YmgalApi {
    async fn search_games(
        &self,
        query: &SearchQuery,
        token: &str,
    ) -> Result<ApiOutcome<SearchEnvelope>, CatalogError> {
        tracing::debug!(keyword = %query.keyword, "Querying catalog search");

        let response = self
            .get(SEARCH_PATH, token)
            .query(query)
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        Self::into_outcome(response).await
    }

    async fn organization(
        &self,
        org_id: &str,
        token: &str,
    ) -> Result<ApiOutcome<OrgEnvelope>, CatalogError> {
        tracing::debug!(org_id = %org_id, "Querying catalog organization");

        let response = self
            .get(ARCHIVE_PATH, token)
            .query(&[("orgId", org_id)])
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        Self::into_outcome(response).await
    }
}
