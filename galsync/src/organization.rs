//! Organization detail lookup
//!
//! A single request per call. A 401 is reported to the log and yields
//! nothing; refreshing the credential is left to the next search.

use crate::catalog::{ApiOutcome, CatalogApi};
use crate::models::OrganizationRecord;
use std::sync::Arc;

pub struct OrganizationClient {
    api: Arc<dyn CatalogApi>,
}

impl OrganizationClient {
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self { api }
    }

    /// Fetch organization detail, or `None` on any failure
    pub async fn fetch_organization(&self, org_id: &str, token: &str) -> Option<OrganizationRecord> {
        tracing::info!(org_id = %org_id, "Fetching organization");

        let outcome = match self.api.organization(org_id, token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(org_id = %org_id, error = %e, "Organization request failed");
                return None;
            }
        };

        match outcome {
            ApiOutcome::Success(envelope) => {
                let record = envelope.into_record(org_id);
                if record.is_none() {
                    tracing::warn!(org_id = %org_id, "Organization missing from response");
                }
                record
            }
            ApiOutcome::Unauthorized => {
                tracing::warn!(org_id = %org_id, "Organization lookup unauthorized");
                None
            }
            ApiOutcome::Failed { status, .. } => {
                tracing::warn!(org_id = %org_id, status, "Organization lookup failed");
                None
            }
        }
    }
}
