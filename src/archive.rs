//! Client for a Pushshift-compatible archive (pullpush by default).
//!
//! All requests go through one shared [`TokenBucket`]. Failed requests back off
//! exponentially and push a cooldown into the bucket, so other sessions sharing it slow
//! down too. Duplicate snapshots of a comment are reconciled with the merge rule from
//! [`crate::normalize`].

use crate::config::ClientOptions;
use crate::error::{Error, Result, TransportError};
use crate::normalize::{is_placeholder, CommentSet};
use crate::records::{Comment, Metadata, Post, SearchResponse};
use crate::retry::{retry_with_backoff, Flow, RetryOutcome, RetryPolicy};
use crate::token_bucket::TokenBucket;
use crate::transport::{HttpTransport, Request, Transport};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::sync::Arc;

const POST_FIELDS: &str = "author,created_utc,domain,edited,id,link_flair_text,num_comments,permalink,position,removed_by_category,retrieved_on,retrieved_utc,score,selftext,subreddit,thumbnail,thumbnail_height,thumbnail_width,title,url";
const COMMENT_FIELDS: &str = "author,body,created_utc,id,link_id,parent_id,retrieved_on,retrieved_utc,score,subreddit";

const POST_CONTEXT: &str = "Could not get removed/edited post";
const COMMENTS_CONTEXT: &str = "Could not get removed comments";

/// Decides when a page means "nothing more to fetch".
///
/// With `total_results` in the metadata the answer is exact. Archives that omit it get
/// a heuristic: a page holding fewer than `min_fill * chunk_size` items is the last one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageCompletion {
    pub min_fill: f64,
}

impl Default for PageCompletion {
    fn default() -> Self { Self { min_fill: 0.5 } }
}

impl PageCompletion {
    pub fn is_complete(&self, metadata: Option<&Metadata>, returned: usize, chunk_size: usize) -> bool {
        match metadata.and_then(|m| m.total_results.map(|total| (m.results_returned, total))) {
            Some((results_returned, total)) => results_returned >= total,
            None => (returned as f64) < chunk_size as f64 * self.min_fill,
        }
    }
}

/// Time window and size target for one [`ArchiveClient::get_comments`] session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommentWindow {
    pub max_comments: usize,
    /// Only comments created after this epoch second; 0 means no lower bound.
    pub after: i64,
    pub before: Option<i64>,
}

impl CommentWindow {
    pub fn new(max_comments: usize) -> Self {
        Self { max_comments, after: 0, before: None }
    }
    pub fn after(mut self, after: i64) -> Self {
        self.after = after;
        self
    }
    pub fn before(mut self, before: i64) -> Self {
        self.before = Some(before);
        self
    }
}

/// What a `get_comments` session ended with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Creation time of the newest comment seen; resume cursor for the next session.
    pub last_created_utc: i64,
    /// False when the callback asked to stop.
    pub keep_loading: bool,
}

pub struct ArchiveClient {
    transport: Arc<dyn Transport>,
    bucket: Arc<TokenBucket>,
    base: Url,
    chunk_size: usize,
    ids_retry: RetryPolicy,
    paged_retry: RetryPolicy,
    completion: PageCompletion,
}

impl ArchiveClient {
    /// `bucket` may be shared with other clients hitting the same archive.
    pub fn new(transport: Arc<dyn Transport>, bucket: Arc<TokenBucket>, opts: &ClientOptions) -> Result<Self> {
        if opts.chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be > 0".into()));
        }
        let mut base = opts.archive_base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| Error::InvalidArgument(format!("archive base url {:?}: {e}", opts.archive_base_url)))?;
        Ok(Self {
            transport,
            bucket,
            base,
            chunk_size: opts.chunk_size,
            ids_retry: opts.ids_retry,
            paged_retry: opts.paged_retry,
            completion: opts.completion,
        })
    }

    /// Builds the reqwest transport and a fresh bucket from `opts`.
    pub fn from_options(opts: &ClientOptions) -> Result<Self> {
        let transport = HttpTransport::new(&opts.user_agent, opts.request_timeout)?;
        let bucket = TokenBucket::new(opts.bucket_interval, opts.bucket_capacity)?;
        Self::new(Arc::new(transport), Arc::new(bucket), opts)
    }

    pub fn bucket(&self) -> &Arc<TokenBucket> { &self.bucket }
    pub fn chunk_size(&self) -> usize { self.chunk_size }

    /// Archived snapshot of a submission. The archive lists snapshots newest first; when
    /// the newest already shows a placeholder body the older (pre-removal) one is returned.
    /// Failures are logged and treated as "no archived version".
    pub async fn get_post(&self, thread_id: &str) -> Option<Post> {
        self.bucket.acquire().await;
        let url = match self.endpoint("reddit/submission/search/", &[("fields", POST_FIELDS), ("ids", thread_id)]) {
            Ok(u) => u,
            Err(e) => {
                tracing::error!("archive.get_post: {}: {}", POST_CONTEXT, e);
                return None;
            }
        };
        let resp: SearchResponse<Post> = match self.search(&url).await {
            Ok(r) => r,
            Err(e) => {
                let err = Error::archive(POST_CONTEXT, e);
                tracing::error!("archive.get_post({}): {}", thread_id, err);
                return None;
            }
        };

        let mut snapshots = resp.data.into_iter();
        let newest = snapshots.next();
        match newest {
            Some(p) if is_placeholder(&p.selftext) => snapshots.next(),
            Some(p) => Some(p),
            None => {
                tracing::debug!("archive.get_post({}): no snapshots", thread_id);
                None
            }
        }
    }

    /// Archived versions of the given comments, fetched in one batched request and
    /// retried under the by-ids policy. Ids may be bare or fullnames.
    pub async fn get_comments_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Comment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(",");
        let url = self.endpoint("reddit/comment/search/", &[("fields", COMMENT_FIELDS), ("ids", &joined)])?;

        let this = self;
        let url_ref = &url;
        let outcome = retry_with_backoff(
            self.bucket.as_ref(),
            self.ids_retry,
            "archive.get_comments_by_ids",
            move || this.search::<Comment>(url_ref),
            |_| Flow::Continue,
        )
        .await;

        let resp = match outcome {
            RetryOutcome::Success(r) => r,
            RetryOutcome::Exhausted { error, failures, total_backoff } => {
                tracing::error!(
                    "archive.get_comments_by_ids: giving up after {} failures ({}ms backoff): {}",
                    failures, total_backoff.as_millis(), error
                );
                return Err(Error::archive(COMMENTS_CONTEXT, error));
            }
            // observer above never stops
            RetryOutcome::Stopped => return Ok(Vec::new()),
        };

        let set: CommentSet = resp.data.into_iter().collect();
        Ok(set
            .into_vec()
            .into_iter()
            .map(|mut c| {
                c.normalize_ids(None);
                c
            })
            .collect())
    }

    /// Pages through a thread's archived comments oldest-first.
    ///
    /// `on_batch` receives an empty batch after every failed request (so the caller can
    /// bail out of a retry storm) and, unless it stopped earlier, exactly one final batch
    /// holding every deduplicated, normalized comment. Returning [`Flow::Stop`] ends the
    /// session without further requests.
    pub async fn get_comments<F>(&self, thread_id: &str, window: CommentWindow, mut on_batch: F) -> Result<FetchOutcome>
    where
        F: FnMut(Vec<Comment>) -> Flow,
    {
        let mut chunks = window.max_comments / self.chunk_size;
        let mut after = window.after;
        let mut last_created_utc: i64 = 1;
        let mut set = CommentSet::with_capacity(window.max_comments.min(4 * self.chunk_size));

        loop {
            let url = self.page_url(thread_id, after, window.before)?;
            let this = self;
            let url_ref = &url;
            let outcome = retry_with_backoff(
                self.bucket.as_ref(),
                self.paged_retry,
                "archive.get_comments",
                move || this.search::<Comment>(url_ref),
                |_| on_batch(Vec::new()),
            )
            .await;

            let page = match outcome {
                RetryOutcome::Success(p) => p,
                RetryOutcome::Stopped => {
                    tracing::debug!("archive.get_comments({}): stopped by caller", thread_id);
                    return Ok(FetchOutcome { last_created_utc, keep_loading: false });
                }
                RetryOutcome::Exhausted { error, failures, total_backoff } => {
                    tracing::error!(
                        "archive.get_comments({}): giving up after {} failures ({}ms backoff): {}",
                        thread_id, failures, total_backoff.as_millis(), error
                    );
                    return Err(Error::archive(COMMENTS_CONTEXT, error));
                }
            };

            let returned = page.data.len();
            let complete = self.completion.is_complete(page.metadata.as_ref(), returned, self.chunk_size);
            if let Some(last) = page.data.last() {
                last_created_utc = last.created_utc;
            }
            set.extend(page.data);
            tracing::debug!(
                "archive.get_comments({}): page of {} (total {}), after={}, complete={}",
                thread_id, returned, set.len(), after, complete
            );

            if complete || chunks <= 1 {
                break;
            }
            chunks -= 1;
            // -1: siblings created in the same second as the cursor; +1: always advance
            after = last_created_utc.saturating_sub(1).max(after.saturating_add(1));
        }

        let comments: Vec<Comment> = set
            .into_vec()
            .into_iter()
            .map(|mut c| {
                c.normalize_ids(Some(thread_id));
                c
            })
            .collect();
        let flow = on_batch(comments);
        Ok(FetchOutcome { last_created_utc, keep_loading: flow.is_continue() })
    }

    fn page_url(&self, thread_id: &str, after: i64, before: Option<i64>) -> Result<Url> {
        let size = self.chunk_size.to_string();
        let mut url = self.endpoint(
            "reddit/comment/search/",
            &[("fields", COMMENT_FIELDS), ("metadata", "true"), ("size", &size), ("sort", "asc"), ("link_id", thread_id)],
        )?;
        {
            let mut q = url.query_pairs_mut();
            if after != 0 {
                q.append_pair("after", &after.to_string());
            }
            if let Some(b) = before {
                q.append_pair("before", &b.to_string());
            }
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| Error::InvalidArgument(format!("archive endpoint {path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(params.iter().copied());
        Ok(url)
    }

    async fn search<T: DeserializeOwned>(&self, url: &Url) -> Result<SearchResponse<T>, TransportError> {
        tracing::debug!("archive GET {}", url);
        let resp = self.transport.send(Request::get(url.as_str())).await?;
        resp.json()
    }
}
