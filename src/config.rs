use crate::archive::PageCompletion;
use crate::retry::RetryPolicy;
use crate::util::env_nonempty;
use std::time::Duration;

pub const DEFAULT_ARCHIVE_URL: &str = "https://api.pullpush.io";
pub const DEFAULT_LIVE_URL: &str = "https://oauth.reddit.com";
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
/// Installed-app client id; replace with your own for heavy use.
pub const DEFAULT_CLIENT_ID: &str = "9umhhai8Bd3u3wh69U2dZw";

/// Upper bound for a single thread's comment target.
pub const MAX_COMMENTS_LIMIT: usize = 20_000;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub archive_base_url: String,
    pub live_base_url: String,
    pub auth_url: String,
    pub client_id: String,
    pub user_agent: String,
    pub request_timeout: Option<Duration>, // None: no per-request timeout

    // archive pacing
    pub chunk_size: usize,            // comments per archive page (`size=`)
    pub bucket_interval: Duration,    // one token per interval
    pub bucket_capacity: u32,
    pub ids_retry: RetryPolicy,
    pub paged_retry: RetryPolicy,
    pub completion: PageCompletion,

    // live pacing
    pub live_rate_limit: u32,         // calls per window until headers say otherwise
    pub live_reset_margin: Duration,  // extra wait past the reported reset
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            archive_base_url: DEFAULT_ARCHIVE_URL.to_string(),
            live_base_url: DEFAULT_LIVE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            user_agent: concat!("rethread/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: None,

            chunk_size: 100,
            bucket_interval: Duration::from_millis(2015),
            bucket_capacity: 7,
            ids_retry: RetryPolicy::by_ids(),
            paged_retry: RetryPolicy::paged(),
            completion: PageCompletion::default(),

            live_rate_limit: 300,
            live_reset_margin: Duration::from_secs(1),
        }
    }
}

impl ClientOptions {
    /// Defaults overlaid with `RETHREAD_ARCHIVE_URL`, `RETHREAD_LIVE_URL`,
    /// `RETHREAD_CLIENT_ID` and `RETHREAD_USER_AGENT` when set.
    pub fn from_env() -> Self {
        let mut o = Self::default();
        if let Some(v) = env_nonempty("RETHREAD_ARCHIVE_URL") { o.archive_base_url = v; }
        if let Some(v) = env_nonempty("RETHREAD_LIVE_URL") { o.live_base_url = v; }
        if let Some(v) = env_nonempty("RETHREAD_CLIENT_ID") { o.client_id = v; }
        if let Some(v) = env_nonempty("RETHREAD_USER_AGENT") { o.user_agent = v; }
        o
    }

    pub fn with_archive_base_url(mut self, url: impl Into<String>) -> Self {
        self.archive_base_url = url.into();
        self
    }
    pub fn with_live_base_url(mut self, url: impl Into<String>) -> Self {
        self.live_base_url = url.into();
        self
    }
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }
    pub fn with_bucket(mut self, interval: Duration, capacity: u32) -> Self {
        self.bucket_interval = interval;
        self.bucket_capacity = capacity;
        self
    }
    pub fn with_ids_retry(mut self, policy: RetryPolicy) -> Self {
        self.ids_retry = policy;
        self
    }
    pub fn with_paged_retry(mut self, policy: RetryPolicy) -> Self {
        self.paged_retry = policy;
        self
    }
    pub fn with_completion(mut self, completion: PageCompletion) -> Self {
        self.completion = completion;
        self
    }
    pub fn with_live_rate_limit(mut self, calls: u32, reset_margin: Duration) -> Self {
        self.live_rate_limit = calls;
        self.live_reset_margin = reset_margin;
        self
    }

    /// Default comment target for a thread: four pages.
    pub fn default_max_comments(&self) -> usize {
        self.chunk_size * 4
    }

    /// Clamps a requested comment target to `[chunk_size, MAX_COMMENTS_LIMIT]`.
    pub fn constrain_max_comments(&self, requested: usize) -> usize {
        requested.clamp(self.chunk_size.min(MAX_COMMENTS_LIMIT), MAX_COMMENTS_LIMIT)
    }
}
