//! Scripted catalog and token source
//!
//! Responses are scripted per keyword / organization id. The n-th call for a
//! key gets the n-th reply; the last reply repeats once the script runs out.
//! Unscripted keywords return an empty result list and unscripted
//! organizations a 404.

use async_trait::async_trait;
use galsync::catalog::{ApiOutcome, CatalogApi, CatalogError, OrgEnvelope, SearchEnvelope, SearchQuery};
use galsync::credential::{AuthError, TokenSource};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Unauthorized,
    Status(u16),
    NetworkError,
}

#[derive(Default)]
pub struct ScriptedCatalog {
    searches: Mutex<HashMap<String, Vec<Reply>>>,
    organizations: Mutex<HashMap<String, Vec<Reply>>>,
    search_log: Mutex<Vec<(String, String)>>,
    org_log: Mutex<Vec<String>>,
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(self, keyword: &str, replies: Vec<Reply>) -> Self {
        self.searches
            .lock()
            .unwrap()
            .insert(keyword.to_string(), replies);
        self
    }

    pub fn on_organization(self, org_id: &str, replies: Vec<Reply>) -> Self {
        self.organizations
            .lock()
            .unwrap()
            .insert(org_id.to_string(), replies);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_log.lock().unwrap().len()
    }

    pub fn searches_for(&self, keyword: &str) -> usize {
        self.search_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == keyword)
            .count()
    }

    /// Tokens presented to the search endpoint, in call order
    pub fn search_tokens(&self) -> Vec<String> {
        self.search_log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn org_calls(&self) -> usize {
        self.org_log.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls() + self.org_calls()
    }
}

fn next_reply(script: &Mutex<HashMap<String, Vec<Reply>>>, key: &str, call: usize) -> Option<Reply> {
    let script = script.lock().unwrap();
    let replies = script.get(key)?;
    replies.get(call).or_else(|| replies.last()).cloned()
}

fn into_outcome<T: serde::de::DeserializeOwned>(
    reply: Reply,
) -> Result<ApiOutcome<T>, CatalogError> {
    match reply {
        Reply::Json(body) => serde_json::from_value(body)
            .map(ApiOutcome::Success)
            .map_err(|e| CatalogError::ParseError(e.to_string())),
        Reply::Unauthorized => Ok(ApiOutcome::Unauthorized),
        Reply::Status(status) => Ok(ApiOutcome::Failed {
            status,
            body: String::new(),
        }),
        Reply::NetworkError => Err(CatalogError::NetworkError("connection reset".into())),
    }
}

#[async_trait]
impl CatalogApi for ScriptedCatalog {
    async fn search_games(
        &self,
        query: &SearchQuery,
        token: &str,
    ) -> Result<ApiOutcome<SearchEnvelope>, CatalogError> {
        let call = self.searches_for(&query.keyword);
        self.search_log
            .lock()
            .unwrap()
            .push((query.keyword.clone(), token.to_string()));

        let reply = next_reply(&self.searches, &query.keyword, call)
            .unwrap_or_else(|| Reply::Json(search_body(vec![])));
        into_outcome(reply)
    }

    async fn organization(
        &self,
        org_id: &str,
        _token: &str,
    ) -> Result<ApiOutcome<OrgEnvelope>, CatalogError> {
        let call = {
            let mut log = self.org_log.lock().unwrap();
            let previous = log.iter().filter(|id| *id == org_id).count();
            log.push(org_id.to_string());
            previous
        };

        let reply = next_reply(&self.organizations, org_id, call).unwrap_or(Reply::Status(404));
        into_outcome(reply)
    }
}

/// Hands out `token-1`, `token-2`, ...; fails every call from `fail_from` on
pub struct ScriptedTokens {
    calls: AtomicUsize,
    fail_from: Option<usize>,
}

impl ScriptedTokens {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from: None,
        }
    }

    pub fn failing_from(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from: Some(call),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedTokens {
    async fn acquire(&self) -> Result<String, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.map_or(false, |from| n >= from) {
            return Err(AuthError::Rejected(401, "invalid_client".into()));
        }
        Ok(format!("token-{}", n))
    }
}

/// A search hit with a flattened organization id
pub fn game(name: &str, score: f64, org_id: &str) -> Value {
    json!({
        "name": name,
        "chineseName": format!("{}-cn", name),
        "id": 100,
        "score": score,
        "orgId": org_id,
    })
}

pub fn search_body(items: Vec<Value>) -> Value {
    json!({ "data": { "result": items } })
}

pub fn org_body(org: Value) -> Value {
    json!({ "data": { "org": org } })
}
