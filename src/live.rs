//! Client for the live Reddit API (OAuth host), used to compare what is visible today
//! with the archived copies.
//!
//! Calls are paced by a [`RateBudget`] that trusts the `x-ratelimit-*` headers Reddit
//! returns, and authenticated with an anonymous installed-client token.

use crate::config::ClientOptions;
use crate::error::{Error, Result, TransportError};
use crate::normalize::looks_like_removal_notice;
use crate::records::LiveItem;
use crate::throttle::Throttle;
use crate::transport::{HttpTransport, Request, Response, Transport};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

const LIVE_CONTEXT: &str = "Could not connect to Reddit";
const TOKEN_BODY: &str =
    "grant_type=https%3A%2F%2Foauth.reddit.com%2Fgrants%2Finstalled_client&device_id=DO_NOT_TRACK_THIS_DEVICE";
/// Tokens are refreshed this long before the server says they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(10);
/// A reported reset this far past ours means a new window started.
const NEW_WINDOW_THRESHOLD: Duration = Duration::from_secs(30);
const MAX_PARENTS: usize = 8;

// ------------------------------ Rate budget ------------------------------

#[derive(Debug)]
struct BudgetState {
    limit: i64,
    remaining: i64,
    reset_at: Option<Instant>,
}

/// Server-reported call budget (default 300 calls per window).
///
/// Local bookkeeping counts calls down; response headers correct the count and the reset
/// time. Once the budget is spent, callers wait until the reported reset plus a margin.
#[derive(Debug)]
pub struct RateBudget {
    margin: Duration,
    state: Mutex<BudgetState>,
}

impl RateBudget {
    pub fn new(limit: u32, margin: Duration) -> Self {
        let limit = i64::from(limit.max(1));
        Self { margin, state: Mutex::new(BudgetState { limit, remaining: limit, reset_at: None }) }
    }

    pub fn limit(&self) -> i64 { self.state.lock().limit }
    pub fn remaining(&self) -> i64 { self.state.lock().remaining }

    /// Time left until the current window resets, if one is known and still ahead.
    pub fn reset_in(&self) -> Option<Duration> {
        let reset_at = self.state.lock().reset_at?;
        reset_at.checked_duration_since(Instant::now())
    }

    /// Waits for the window to reset when the budget is spent, then spends one call.
    pub async fn acquire(&self) {
        let wait_until = {
            let s = self.state.lock();
            if s.remaining <= 0 { s.reset_at.map(|t| t + self.margin) } else { None }
        };
        if let Some(deadline) = wait_until {
            let now = Instant::now();
            if deadline > now {
                tracing::info!("Waiting {}ms for Reddit API", (deadline - now).as_millis());
                sleep_until(deadline).await;
            }
        }

        let mut s = self.state.lock();
        if s.remaining <= 0 {
            s.remaining = s.limit;
        }
        s.remaining -= 1;
    }

    /// Folds the `x-ratelimit-*` headers of a response into the local budget.
    /// Responses without any of them leave the budget untouched.
    pub fn observe(&self, resp: &Response) {
        let read = |name: &str| resp.header(name).and_then(|v| v.trim().parse::<f64>().ok()).filter(|v| v.is_finite());
        let (remaining, used, reset) =
            (read("x-ratelimit-remaining"), read("x-ratelimit-used"), read("x-ratelimit-reset"));
        if remaining.is_none() && used.is_none() && reset.is_none() {
            return;
        }
        let reported_remaining = remaining.unwrap_or(0.0) as i64;
        let reported_limit = reported_remaining + used.unwrap_or(0.0) as i64;
        let reported_reset = Instant::now() + Duration::from_secs_f64(reset.unwrap_or(0.0).clamp(0.0, 1e9));

        let mut s = self.state.lock();
        if reported_limit != 0 && reported_limit != s.limit {
            tracing::warn!("Correcting live rate limit from {} to {}", s.limit, reported_limit);
            s.limit = reported_limit;
        }

        match s.reset_at {
            Some(local) if reported_reset <= local + NEW_WINDOW_THRESHOLD => {
                if reported_reset < local {
                    tracing::debug!("Moving live rate limit reset earlier by {}ms", (local - reported_reset).as_millis());
                    s.reset_at = Some(reported_reset);
                }
                if reported_remaining < s.remaining {
                    tracing::warn!("Decreasing live remaining calls from {} to {}", s.remaining, reported_remaining);
                    s.remaining = reported_remaining;
                }
            }
            _ => {
                tracing::debug!("New live rate limit window, resets in {}s", reset.unwrap_or(0.0));
                s.reset_at = Some(reported_reset);
            }
        }
    }

    /// Marks the budget spent until `delay` from now.
    pub fn exhaust_for(&self, delay: Duration) {
        let mut s = self.state.lock();
        s.remaining = 0;
        s.reset_at = Some(Instant::now() + delay);
    }
}

#[async_trait]
impl Throttle for RateBudget {
    async fn acquire(&self) { RateBudget::acquire(self).await }
    fn cooldown(&self, delay: Duration) { self.exhaust_for(delay) }
}

// ------------------------------ Token ------------------------------

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Value,
}

fn seconds_from(v: &Value) -> u64 {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f.max(0.0) as u64).unwrap_or(0),
        _ => 0,
    }
}

// ------------------------------ Listings ------------------------------

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: LiveItem,
}

impl Listing {
    fn into_items(self) -> Vec<LiveItem> {
        self.data.children.into_iter().map(|c| c.data).collect()
    }
}

// ------------------------------ Client ------------------------------

pub struct LiveClient {
    transport: Arc<dyn Transport>,
    budget: Arc<RateBudget>,
    base: Url,
    auth_url: String,
    basic_auth: String,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl LiveClient {
    pub fn new(transport: Arc<dyn Transport>, budget: Arc<RateBudget>, opts: &ClientOptions) -> Result<Self> {
        let mut base = opts.live_base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| Error::InvalidArgument(format!("live base url {:?}: {e}", opts.live_base_url)))?;
        Ok(Self {
            transport,
            budget,
            base,
            auth_url: opts.auth_url.clone(),
            basic_auth: format!("Basic {}", BASE64.encode(format!("{}:", opts.client_id))),
            token: tokio::sync::Mutex::new(None),
        })
    }

    pub fn from_options(opts: &ClientOptions) -> Result<Self> {
        let transport = HttpTransport::new(&opts.user_agent, opts.request_timeout)?;
        let budget = RateBudget::new(opts.live_rate_limit, opts.live_reset_margin);
        Self::new(Arc::new(transport), Arc::new(budget), opts)
    }

    pub fn budget(&self) -> &Arc<RateBudget> { &self.budget }

    /// The submission as Reddit shows it now.
    pub async fn get_post(&self, thread_id: &str) -> Result<LiveItem> {
        let url = self.endpoint(&format!("comments/{thread_id}.json"), &[("limit", "1")])?;
        let listings: Vec<Listing> = self.fetch_json(&url).await.map_err(|e| fail("live.get_post", e))?;
        listings
            .into_iter()
            .next()
            .and_then(|l| l.into_items().into_iter().next())
            .ok_or_else(|| fail("live.get_post", TransportError::Decode(format!("no post in listing for {thread_id}"))))
    }

    /// Several submissions at once through the info endpoint.
    pub async fn get_threads<S: AsRef<str>>(&self, thread_ids: &[S]) -> Result<Vec<LiveItem>> {
        self.info("t3_", thread_ids, "live.get_threads").await
    }

    /// Several comments at once through the info endpoint.
    pub async fn get_comments<S: AsRef<str>>(&self, comment_ids: &[S]) -> Result<Vec<LiveItem>> {
        self.info("t1_", comment_ids, "live.get_comments").await
    }

    /// Up to eight ancestors of a comment, outermost first. The comment itself and
    /// anything listed after it are dropped.
    pub async fn get_parent_comments(&self, thread_id: &str, comment_id: &str, parents: usize) -> Result<Vec<LiveItem>> {
        let parents = parents.min(MAX_PARENTS).to_string();
        let url = self.endpoint(
            &format!("comments/{thread_id}"),
            &[
                ("comment", comment_id),
                ("context", &parents),
                ("limit", &parents),
                ("threaded", "false"),
                ("showmore", "false"),
            ],
        )?;
        let listings: Vec<Listing> = self.fetch_json(&url).await.map_err(|e| fail("live.get_parent_comments", e))?;
        let mut items = listings
            .into_iter()
            .nth(1)
            .map(Listing::into_items)
            .ok_or_else(|| fail("live.get_parent_comments", TransportError::Decode("missing comment listing".into())))?;
        if let Some(idx) = items.iter().position(|c| c.id() == Some(comment_id)) {
            items.truncate(idx);
        }
        Ok(items)
    }

    async fn info<S: AsRef<str>>(&self, prefix: &str, ids: &[S], label: &str) -> Result<Vec<LiveItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let fullnames = ids.iter().map(|id| format!("{prefix}{}", id.as_ref())).collect::<Vec<_>>().join(",");
        let url = self.endpoint("api/info", &[("id", &fullnames)])?;
        let listing: Listing = self.fetch_json(&url).await.map_err(|e| fail(label, e))?;
        Ok(listing.into_items())
    }

    /// Authenticated GET through the rate budget.
    async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, TransportError> {
        let token = self.access_token().await?;
        self.budget.acquire().await;
        tracing::debug!("live GET {}", url);
        let req = Request::get(url.as_str())
            .header("Authorization", format!("bearer {token}"))
            .header("Accept-Language", "en");
        let resp = self.transport.send(req).await?;
        self.budget.observe(&resp);
        resp.json()
    }

    /// Cached bearer token. The slot stays locked while a refresh is in flight, so
    /// concurrent callers share one token request.
    async fn access_token(&self) -> Result<String, TransportError> {
        let mut slot = self.token.lock().await;
        if let Some(t) = slot.as_ref() {
            if t.expires_at > Instant::now() {
                return Ok(t.value.clone());
            }
        }

        let req = Request::post(self.auth_url.as_str(), TOKEN_BODY)
            .header("Authorization", self.basic_auth.as_str())
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8");
        let resp: TokenResponse = match self.transport.send(req).await.and_then(|r| r.json()) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("live.access_token: {}", e);
                return Err(e);
            }
        };
        let lifetime = Duration::from_secs(seconds_from(&resp.expires_in)).saturating_sub(TOKEN_SLACK);
        *slot = Some(CachedToken { value: resp.access_token.clone(), expires_at: Instant::now() + lifetime });
        Ok(resp.access_token)
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| Error::InvalidArgument(format!("live endpoint {path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(params.iter().copied());
        Ok(url)
    }
}

fn fail(label: &str, cause: TransportError) -> Error {
    tracing::error!("{}: {}", label, cause);
    Error::live(LIVE_CONTEXT, cause)
}

/// Whether a live submission or comment has been taken down.
///
/// Missing or bracketed authors, removal markers and collapsed-as-deleted all count;
/// otherwise the text decides (bracketed short notices mentioning deleted/removed).
pub fn is_thread_deleted(item: &LiveItem) -> bool {
    let present = |key: &str| item.0.get(key).is_some_and(|v| !v.is_null());
    let is_topic = present("title");

    let Some(author) = item.author() else { return true };
    if author.starts_with('[') && author.ends_with(']') {
        return true;
    }
    if present("removed_by_category") || present("removal_reason") {
        return true;
    }
    if item.str_field("collapsed_reason_code").is_some_and(|c| c.eq_ignore_ascii_case("deleted")) {
        return true;
    }

    let text = if is_topic { item.selftext() } else { item.body() };
    match text {
        None => true,
        Some("") if !is_topic => true,
        Some(t) => looks_like_removal_notice(t),
    }
}
