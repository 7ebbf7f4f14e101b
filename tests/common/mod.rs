#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rethread::{ClientOptions, Request, Response, Transport, TransportError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// In-memory transport answering from a script, one entry per request, in order.
/// Every request is recorded. An exhausted script answers with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response, TransportError>>>,
    seen: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn push_json(&self, body: Value) {
        self.script.lock().push_back(Ok(Response::ok(body.to_string())));
    }
    pub fn push_response(&self, resp: Response) {
        self.script.lock().push_back(Ok(resp));
    }
    pub fn push_status(&self, status: u16, body: &str) {
        self.script.lock().push_back(Ok(Response { status, headers: vec![], body: body.to_string() }));
    }
    pub fn push_network_error(&self) {
        self.script.lock().push_back(Err(TransportError::Network("connection refused".into())));
    }

    pub fn requests(&self) -> Vec<Request> { self.seen.lock().clone() }
    pub fn urls(&self) -> Vec<String> { self.seen.lock().iter().map(|r| r.url.clone()).collect() }
    pub fn remaining(&self) -> usize { self.script.lock().len() }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: Request) -> Result<Response, TransportError> {
        self.seen.lock().push(req);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
    }
}

/// Value of query parameter `key` in `url`, decoded.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).unwrap();
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

/// Options pointing at `base` with pacing small enough for real-time tests.
pub fn fast_options(base: &str) -> ClientOptions {
    ClientOptions::default()
        .with_archive_base_url(base)
        .with_live_base_url(base)
        .with_auth_url(format!("{base}/api/v1/access_token"))
        .with_bucket(Duration::from_millis(1), 100)
        .with_ids_retry(rethread::RetryPolicy::new(Duration::from_millis(1), 2, Duration::from_millis(20)))
        .with_paged_retry(rethread::RetryPolicy::new(Duration::from_millis(1), 2, Duration::from_millis(20)))
}

/// Archived comment as the archive returns it (fullname link/parent ids).
pub fn comment_json(id: &str, thread: &str, created_utc: i64, body: &str) -> Value {
    json!({
        "id": id, "body": body, "author": "someone", "score": 1,
        "link_id": format!("t3_{thread}"), "parent_id": format!("t3_{thread}"),
        "created_utc": created_utc, "subreddit": "programming"
    })
}

/// `count` comments on `thread` with consecutive creation times starting at `first_created`.
pub fn comments_run(thread: &str, prefix: &str, first_created: i64, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| comment_json(&format!("{prefix}{i}"), thread, first_created + i as i64, "text"))
        .collect()
}

/// Archive search page. `total` goes into `metadata.total_results` when given.
pub fn page(data: Vec<Value>, total: Option<u64>) -> Value {
    let mut metadata = json!({ "results_returned": data.len() });
    if let Some(t) = total {
        metadata["total_results"] = json!(t);
    }
    json!({ "data": data, "metadata": metadata })
}

/// Reddit listing wrapper around raw things.
pub fn listing(kind: &str, things: Vec<Value>) -> Value {
    let children: Vec<Value> = things.into_iter().map(|d| json!({ "kind": kind, "data": d })).collect();
    json!({ "kind": "Listing", "data": { "children": children } })
}
