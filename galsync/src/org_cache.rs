//! Organization cache and lookup retry policy
//!
//! Entries loaded from the organization table start with a retry count of 0.
//! An id first seen this run starts at 1. Every later encounter of an
//! incomplete record (missing website or description) increments the count,
//! and a remote lookup happens only while the count is within the
//! [`RetryBudget`]. Once the budget is spent the cached record is returned
//! as-is, complete or not.

use crate::models::OrganizationRecord;
use crate::organization::OrganizationClient;
use crate::retry::RetryBudget;
use crate::store::IncrementalStore;
use std::collections::HashMap;

/// Cached detail plus the number of lookups charged against it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgCacheEntry {
    pub record: Option<OrganizationRecord>,
    pub retry_count: u32,
}

impl OrgCacheEntry {
    fn needs_lookup(&self) -> bool {
        !self.record.as_ref().map_or(false, OrganizationRecord::is_complete)
    }
}

pub struct OrganizationCache {
    entries: HashMap<String, OrgCacheEntry>,
    budget: RetryBudget,
}

impl OrganizationCache {
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            entries: HashMap::new(),
            budget,
        }
    }

    /// Seed from persisted records; later rows for the same id win
    pub fn from_records(records: Vec<OrganizationRecord>, budget: RetryBudget) -> Self {
        let mut cache = Self::new(budget);
        for record in records {
            if record.org_id.is_empty() {
                continue;
            }
            cache.entries.insert(
                record.org_id.clone(),
                OrgCacheEntry {
                    record: Some(record),
                    retry_count: 0,
                },
            );
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, org_id: &str) -> Option<&OrgCacheEntry> {
        self.entries.get(org_id)
    }

    /// Best-known detail for `org_id`, looking it up remotely when allowed
    ///
    /// A successful lookup overwrites the cache entry and is appended to the
    /// organization table. A lookup that fails returns `None` for this call
    /// and leaves the entry for a later retry.
    pub async fn resolve(
        &mut self,
        org_id: &str,
        client: &OrganizationClient,
        token: &str,
        store: &IncrementalStore,
    ) -> Option<OrganizationRecord> {
        if org_id.is_empty() {
            return None;
        }

        let entry = self.entries.entry(org_id.to_string()).or_default();
        let wants_lookup = entry.needs_lookup();
        if wants_lookup {
            entry.retry_count += 1;
        }

        if !wants_lookup || !self.budget.allows(entry.retry_count) {
            if wants_lookup {
                tracing::debug!(
                    org_id = %org_id,
                    retry_count = entry.retry_count,
                    "Organization retry budget spent; using cached record"
                );
            }
            return entry.record.clone();
        }

        let record = client.fetch_organization(org_id, token).await?;

        if let Err(e) = store.append_organization(&record) {
            tracing::error!(org_id = %org_id, error = %e, "Failed to persist organization");
        }
        entry.record = Some(record.clone());
        Some(record)
    }
}
