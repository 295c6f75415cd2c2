//! galsync library interface
//!
//! Matches a local game catalog against the remote archive, enriches the
//! matches with organization detail and persists everything incrementally
//! so that an interrupted run resumes where it stopped. Also hosts the
//! offline aligner and the spreadsheet transforms used by the CLI.

pub mod aligner;
pub mod catalog;
pub mod credential;
pub mod models;
pub mod org_cache;
pub mod organization;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod selector;
pub mod similarity;
pub mod store;
pub mod transforms;

pub use crate::catalog::{ApiOutcome, CatalogApi, CatalogError, SearchQuery, YmgalApi};
pub use crate::credential::{AuthError, Credentials, OAuthTokenSource, TokenSource};
pub use crate::models::{
    CandidateMatch, MatchedRecord, NameVariant, OrganizationRecord, SourceRecord, UnmatchedReason,
};
pub use crate::pipeline::{MatchPipeline, PipelineError, PipelineSettings, RunSummary};
pub use crate::retry::RetryBudget;
pub use crate::store::{IncrementalStore, StoreError, StorePaths, WriteOutcome};
