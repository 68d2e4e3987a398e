//! Shared fixtures: a scripted in-memory search backend, a static portal
//! directory and builders for analytics events and resource documents.
#![allow(dead_code)]

use async_trait::async_trait;
use portalytics::backend::SearchTransport;
use portalytics::{
    ClickAttributionEngine, Checkpoint, Portal, PortalDirectory, PortalyticsConfig,
    PortalyticsError, QueryClient, Result, RetryCeiling, RetryPolicy,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ANALYTICS: &str = "oeh-search-analytics";
pub const WORKSPACE: &str = "workspace";

/// In-memory backend. Resource lookups on the workspace target are served
/// from `documents`; every other request pops the next scripted response
/// for its target (an empty hit list once the script runs dry).
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Value>>>,
    documents: Mutex<HashMap<String, Value>>,
    broken_documents: Mutex<HashSet<String>>,
    transient_failures: AtomicU32,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, target: &str, response: Value) {
        self.scripts
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue one batch of analytics events.
    pub fn push_events(&self, events: Vec<Value>) {
        self.script(ANALYTICS, hits(events));
    }

    pub fn add_document(&self, resource_id: &str, source: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), source);
    }

    /// Lookups for this resource fail with a non-transient error.
    pub fn break_document(&self, resource_id: &str) {
        self.broken_documents
            .lock()
            .unwrap()
            .insert(resource_id.to_string());
    }

    /// The next `n` requests fail with a connection error.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, target: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .count()
    }

    /// Resource ids looked up so far, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, body)| lookup_id(body))
            .collect()
    }
}

fn lookup_id(body: &Value) -> Option<String> {
    body.pointer("/query/match/nodeRef.id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[async_trait]
impl SearchTransport for ScriptedBackend {
    async fn search(&self, target: &str, body: &Value, _pretty: bool) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((target.to_string(), body.clone()));

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PortalyticsError::Connection("connection refused".into()));
        }

        if let Some(id) = lookup_id(body) {
            if self.broken_documents.lock().unwrap().contains(&id) {
                return Err(PortalyticsError::Rejected {
                    target: target.to_string(),
                    status: 400,
                    message: "parse_exception".into(),
                });
            }
            let found: Vec<Value> = self
                .documents
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .into_iter()
                .collect();
            return Ok(hits(found));
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(|queue| queue.pop_front());
        Ok(next.unwrap_or_else(|| hits(Vec::new())))
    }
}

/// Directory returning a fixed portal list, optionally failing.
#[derive(Default)]
pub struct StaticDirectory {
    portals: Mutex<Vec<Portal>>,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl StaticDirectory {
    pub fn new(portals: Vec<Portal>) -> Arc<Self> {
        Arc::new(Self {
            portals: Mutex::new(portals),
            ..Default::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_portals(&self, portals: Vec<Portal>) {
        *self.portals.lock().unwrap() = portals;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortalDirectory for StaticDirectory {
    async fn list_portals(&self) -> Result<Vec<Portal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortalyticsError::Directory("collection service down".into()));
        }
        Ok(self.portals.lock().unwrap().clone())
    }
}

pub fn portal(id: &str, title: &str) -> Portal {
    Portal {
        id: id.to_string(),
        title: title.to_string(),
        name: title.to_lowercase(),
        icon_url: None,
        content_url: None,
        subject_tag: None,
    }
}

/// Wrap sources in a search response, newest first as the backend sorts them.
pub fn hits(sources: Vec<Value>) -> Value {
    let hits: Vec<Value> = sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| json!({"_id": format!("hit-{}", i), "_source": source}))
        .collect();
    json!({"hits": {"total": {"value": hits.len()}, "hits": hits}})
}

pub fn click(resource_id: &str, search: &str, timestamp: &str) -> Value {
    json!({
        "action": "result_click",
        "searchString": search,
        "clickedResult": {"id": resource_id},
        "timestamp": timestamp
    })
}

pub fn impression(search: &str, timestamp: &str) -> Value {
    json!({"action": "impression", "searchString": search, "timestamp": timestamp})
}

/// Workspace document for a resource filed under the given collection paths.
pub fn resource(title: &str, paths: &[&[&str]]) -> Value {
    let collections: Vec<Value> = paths.iter().map(|p| json!({"path": p})).collect();
    json!({
        "properties": {
            "cm:name": format!("{}.html", title.to_lowercase()),
            "cclom:title": [title],
            "ccm:replicationsource": "test_spider",
            "cm:creator": "editor"
        },
        "collections": collections
    })
}

pub fn test_config() -> PortalyticsConfig {
    PortalyticsConfig::for_backend("http://backend.invalid")
}

pub fn client(backend: &Arc<ScriptedBackend>) -> QueryClient {
    QueryClient::new(
        backend.clone(),
        RetryPolicy::new(RetryCeiling::Limited(2), Duration::ZERO),
    )
}

/// Engine over the scripted backend, starting at the given checkpoint.
pub fn engine(
    backend: &Arc<ScriptedBackend>,
    directory: &Arc<StaticDirectory>,
    checkpoint: &str,
) -> ClickAttributionEngine {
    ClickAttributionEngine::new(client(backend), directory.clone(), &test_config())
        .unwrap()
        .with_checkpoint(Checkpoint::new(checkpoint))
}
