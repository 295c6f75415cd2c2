//! Checkpoint / resume controller for the matching run
//!
//! One pass over the source table:
//!
//! ```text
//! LoadSource → LoadCheckpoint → Authenticate → InitStores → LoadOrgCache
//!     → per record: Skip | MatchAndEnrich | RecordUnmatched → Done
//! ```
//!
//! Every processed record is persisted before the next one starts, so a
//! crash loses at most the record in flight. Ids already in the matched
//! table are skipped, which makes re-running the same input a resume.
//!
//! Only structural problems abort a run: an unreadable source table, a
//! missing name column, a failed initial authentication or an output table
//! that cannot be created. Per-record failures are logged and the loop
//! moves on.

use crate::catalog::{CatalogApi, CatalogError, YmgalApi};
use crate::credential::{AuthError, Credentials, OAuthTokenSource, TokenSource};
use crate::models::{MatchedRecord, SourceRecord, UnmatchedReason};
use crate::org_cache::OrganizationCache;
use crate::organization::OrganizationClient;
use crate::retry::RetryBudget;
use crate::search::{SearchClient, SearchOptions};
use crate::selector::MatchSelector;
use crate::store::{IncrementalStore, StoreError, StorePaths, WriteOutcome};
use galsync_common::config::{AppConfig, ColumnsConfig};
use galsync_common::Table;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source table error: {0}")]
    Source(#[from] galsync_common::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Output table error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog client error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Stages of a run, logged as they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LoadSource,
    LoadCheckpoint,
    Authenticate,
    InitStores,
    LoadOrgCache,
    Records,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::LoadSource => "LOAD_SOURCE",
            RunPhase::LoadCheckpoint => "LOAD_CHECKPOINT",
            RunPhase::Authenticate => "AUTHENTICATE",
            RunPhase::InitStores => "INIT_STORES",
            RunPhase::LoadOrgCache => "LOAD_ORG_CACHE",
            RunPhase::Records => "RECORDS",
            RunPhase::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Run parameters
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source: PathBuf,
    pub columns: ColumnsConfig,
    pub search: SearchOptions,
    /// Pause after every record that reached the search stage
    pub request_delay: Duration,
    pub auth_budget: RetryBudget,
    pub org_budget: RetryBudget,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            source: config.files.source.clone(),
            columns: config.columns.clone(),
            search: SearchOptions {
                top_k: config.matching.top_k,
                threshold: config.matching.threshold,
            },
            request_delay: Duration::from_millis(config.matching.request_delay_ms),
            auth_budget: RetryBudget::new(config.matching.auth_attempts),
            org_budget: RetryBudget::new(config.matching.org_retry_limit),
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub skipped: usize,
    pub matched: usize,
    pub unmatched: usize,
}

pub struct MatchPipeline {
    api: Arc<dyn CatalogApi>,
    token_source: Arc<dyn TokenSource>,
    store: IncrementalStore,
    settings: PipelineSettings,
}

impl MatchPipeline {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        token_source: Arc<dyn TokenSource>,
        store: IncrementalStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            api,
            token_source,
            store,
            settings,
        }
    }

    /// Wire the HTTP catalog client and token source from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let timeout = Duration::from_secs(config.api.timeout_secs);
        let api = YmgalApi::new(&config.api.base_url, timeout)?;
        let token_source = OAuthTokenSource::new(
            &config.api.base_url,
            &config.api.client_id,
            &config.api.client_secret,
            &config.api.scope,
            timeout,
        )?;

        Ok(Self::new(
            Arc::new(api),
            Arc::new(token_source),
            IncrementalStore::new(StorePaths::from(&config.files)),
            PipelineSettings::from_config(config),
        ))
    }

    pub fn store(&self) -> &IncrementalStore {
        &self.store
    }

    /// Process every source record not yet in the matched table
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        enter(RunPhase::LoadSource);
        let records = load_source_records(&self.settings.source, &self.settings.columns)?;
        info!(
            path = %self.settings.source.display(),
            records = records.len(),
            "Source table loaded"
        );

        enter(RunPhase::LoadCheckpoint);
        let mut processed = match self.store.processed_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Could not read matched table; reprocessing everything");
                HashSet::new()
            }
        };
        info!(already_processed = processed.len(), "Checkpoint loaded");

        enter(RunPhase::Authenticate);
        let mut credentials = Credentials::authenticate(self.token_source.clone())
            .await
            .map_err(|e| {
                error!(error = %e, "Could not obtain access token; aborting run");
                e
            })?;

        enter(RunPhase::InitStores);
        self.store.init_matched()?;
        self.store.init_unmatched()?;
        self.store.init_organizations()?;

        enter(RunPhase::LoadOrgCache);
        let organizations = self.store.load_organizations().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read organization table; starting with empty cache");
            Vec::new()
        });
        let mut org_cache = OrganizationCache::from_records(organizations, self.settings.org_budget);
        info!(organizations = org_cache.len(), "Organization cache loaded");

        enter(RunPhase::Records);
        let selector = MatchSelector::new(
            SearchClient::with_budget(self.api.clone(), self.settings.auth_budget),
            self.settings.search,
        );
        let org_client = OrganizationClient::new(self.api.clone());

        let mut summary = RunSummary {
            total: records.len(),
            ..Default::default()
        };

        for (idx, record) in records.iter().enumerate() {
            if processed.contains(&record.id) {
                info!(id = %record.id, "Skipping already processed record");
                summary.skipped += 1;
                continue;
            }
            processed.insert(record.id.clone());

            if !record.has_names() {
                info!(id = %record.id, "Both names empty; recording as unmatched");
                self.record_unmatched(record, UnmatchedReason::EmptyName);
                summary.unmatched += 1;
                continue;
            }

            info!(
                progress = format!("{}/{}", idx + 1, records.len()),
                id = %record.id,
                name_a = %record.name_a,
                name_b = %record.name_b,
                "Matching record"
            );

            match selector
                .select_best(&record.name_a, &record.name_b, &mut credentials)
                .await
            {
                Some(best) => {
                    let organization = org_cache
                        .resolve(
                            &best.candidate.org_id,
                            &org_client,
                            credentials.token(),
                            &self.store,
                        )
                        .await;

                    let matched = MatchedRecord::assemble(
                        record,
                        &best.candidate,
                        best.field,
                        organization.as_ref(),
                    );
                    info!(
                        id = %record.id,
                        name = %matched.name,
                        score = matched.score,
                        field = %matched.match_field,
                        "Matched"
                    );
                    self.record_matched(matched);
                    summary.matched += 1;
                }
                None => {
                    info!(id = %record.id, "No candidate found");
                    self.record_unmatched(record, UnmatchedReason::NoCandidate);
                    summary.unmatched += 1;
                }
            }

            if !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
        }

        enter(RunPhase::Done);
        info!(
            total = summary.total,
            skipped = summary.skipped,
            matched = summary.matched,
            unmatched = summary.unmatched,
            "Matching run complete"
        );
        Ok(summary)
    }

    fn record_matched(&self, matched: MatchedRecord) {
        let id = matched.source_id.clone();
        match self.store.append_matched(std::slice::from_ref(&matched)) {
            Ok(WriteOutcome::Primary) => {}
            Ok(diverted) => warn!(id = %id, outcome = ?diverted, "Matched record diverted"),
            Err(e) => error!(id = %id, error = %e, record = ?matched, "Matched record not persisted"),
        }
    }

    fn record_unmatched(&self, record: &SourceRecord, reason: UnmatchedReason) {
        let label = reason.label(&record.id);
        match self.store.append_unmatched(&label) {
            Ok(WriteOutcome::Primary) => {}
            Ok(diverted) => warn!(label = %label, outcome = ?diverted, "Unmatched label diverted"),
            Err(e) => error!(label = %label, error = %e, "Unmatched label not persisted"),
        }
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(phase = %phase, "Entering phase");
}

/// Read the source table
///
/// Both name columns are required. The id column is optional; rows without
/// an id get `ROW_<index>` (0-based).
pub fn load_source_records(
    path: &Path,
    columns: &ColumnsConfig,
) -> galsync_common::Result<Vec<SourceRecord>> {
    let table = Table::load(path)?;
    tracing::debug!(columns = ?table.headers, "Source table columns");
    table.require_columns(&[columns.name_a.as_str(), columns.name_b.as_str()])?;

    let has_id = table.has_column(&columns.id);
    let cell = |row: usize, column: &str| -> String {
        table.get(row, column).map(str::trim).unwrap_or_default().to_string()
    };

    Ok((0..table.len())
        .map(|row| {
            let id = if has_id { cell(row, &columns.id) } else { String::new() };
            SourceRecord {
                id: if id.is_empty() { format!("ROW_{}", row) } else { id },
                name_a: cell(row, &columns.name_a),
                name_b: cell(row, &columns.name_b),
            }
        })
        .collect())
}
