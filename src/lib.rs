mod config;
mod error;
mod util;

mod throttle;
mod token_bucket;
mod retry;
mod chunked_queue;
mod transport;

mod records;
mod normalize;
mod archive;
mod live;
mod reconcile;

mod timefmt;
mod ndjson;
mod progress;

pub use crate::config::{ClientOptions, DEFAULT_ARCHIVE_URL, DEFAULT_AUTH_URL, DEFAULT_CLIENT_ID, DEFAULT_LIVE_URL, MAX_COMMENTS_LIMIT};
pub use crate::error::{Error, Result, TransportError, ARCHIVE_DOWN_HELP};
pub use crate::util::init_tracing_once;

// export limiters and the retry driver
pub use crate::throttle::Throttle;
pub use crate::token_bucket::TokenBucket;
pub use crate::retry::{retry_with_backoff, Backoff, Flow, RetryOutcome, RetryPolicy};
pub use crate::chunked_queue::ChunkedQueue;

// export the HTTP seam so callers (and tests) can substitute a transport
pub use crate::transport::{HttpTransport, Method, Request, Response, Transport};

pub use crate::records::{Comment, LiveItem, Metadata, Post, SearchResponse};
pub use crate::normalize::{
    base36, is_deleted, is_placeholder, is_removed, looks_like_removal_notice, prefers_incoming, strip_fullname,
    to_base36, CommentSet, IdRef, DELETED, REMOVED,
};
pub use crate::archive::{ArchiveClient, CommentWindow, FetchOutcome, PageCompletion};
pub use crate::live::{is_thread_deleted, LiveClient, RateBudget};
pub use crate::reconcile::{reconcile, CommentFilter, CommentSort, Tally, ThreadComment};

// export output helpers for the binary
pub use crate::timefmt::{format_utc, humanize_timestamps, now_unix, parse_time_arg};
pub use crate::ndjson::NdjsonWriter;
pub use crate::progress::ProgressScope;
