#[path = "common/mod.rs"]
mod common;

use common::*;
use rethread::{ArchiveClient, ClientOptions, Comment, CommentWindow, Error, Flow, Metadata, PageCompletion, TokenBucket};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn client(transport: Arc<ScriptedTransport>) -> ArchiveClient {
    let opts = ClientOptions::default().with_archive_base_url("https://archive.test");
    let bucket = TokenBucket::new(opts.bucket_interval, opts.bucket_capacity).unwrap();
    ArchiveClient::new(transport, Arc::new(bucket), &opts).unwrap()
}

/// A 250-comment target buys two pages. The first page is full and reports no total, so
/// paging continues; the second page is short (40 < 50) and ends the session.
#[tokio::test(start_paused = true)]
async fn short_page_ends_session_within_budget() {
    let t = ScriptedTransport::new();
    t.push_json(json!({ "data": comments_run("s1", "a", 1000, 100), "metadata": { "results_returned": 100 } }));
    t.push_json(page(comments_run("s1", "b", 1099, 40), None));

    let mut batches: Vec<Vec<Comment>> = Vec::new();
    let out = client(t.clone())
        .get_comments("s1", CommentWindow::new(250), |b| {
            batches.push(b);
            Flow::Continue
        })
        .await
        .unwrap();

    let urls = t.urls();
    assert_eq!(urls.len(), 2, "two pages expected");
    assert_eq!(query_param(&urls[0], "after"), None);
    assert_eq!(query_param(&urls[0], "size").as_deref(), Some("100"));
    assert_eq!(query_param(&urls[0], "link_id").as_deref(), Some("s1"));
    // last created of page one was 1099; the cursor backs up one second
    assert_eq!(query_param(&urls[1], "after").as_deref(), Some("1098"));

    assert_eq!(batches.len(), 1, "only the final batch is delivered");
    assert_eq!(batches[0].len(), 140);
    assert_eq!(out.last_created_utc, 1099 + 39);
    assert!(out.keep_loading);
}

/// A short page terminates even when the comment target allows many more pages.
#[tokio::test(start_paused = true)]
async fn short_page_wins_over_remaining_budget() {
    let t = ScriptedTransport::new();
    t.push_json(page(comments_run("s1", "a", 1, 100), None));
    t.push_json(page(comments_run("s1", "b", 200, 40), None));
    t.push_json(page(comments_run("s1", "c", 300, 100), None));

    let out = client(t.clone()).get_comments("s1", CommentWindow::new(1000), |_| Flow::Continue).await.unwrap();
    assert_eq!(t.urls().len(), 2);
    assert_eq!(t.remaining(), 1);
    assert_eq!(out.last_created_utc, 239);
}

/// Reported totals take precedence over the half-page heuristic.
#[tokio::test(start_paused = true)]
async fn metadata_totals_decide_completion() {
    let t = ScriptedTransport::new();
    t.push_json(page(comments_run("s1", "a", 1, 100), Some(100)));

    let mut total = 0;
    client(t.clone())
        .get_comments("s1", CommentWindow::new(1000), |b| {
            total += b.len();
            Flow::Continue
        })
        .await
        .unwrap();
    assert_eq!(t.urls().len(), 1, "full page but totals reached");
    assert_eq!(total, 100);
}

/// Duplicate snapshots across pages collapse, keeping a real body over a placeholder,
/// and ids come out bare.
#[tokio::test(start_paused = true)]
async fn final_batch_is_deduplicated_and_normalized() {
    let t = ScriptedTransport::new();
    let mut first = comments_run("s1", "a", 10, 99);
    first.push(comment_json("dup", "s1", 200, "[deleted]"));
    t.push_json(page(first, None));
    let mut reply = comment_json("r1", "s1", 201, "a reply");
    reply["parent_id"] = json!("t1_dup");
    reply["link_id"] = json!(null);
    t.push_json(page(vec![comment_json("dup", "s1", 200, "the original"), reply], None));

    let mut out: Vec<Comment> = Vec::new();
    client(t.clone())
        .get_comments("s1", CommentWindow::new(400), |b| {
            out.extend(b);
            Flow::Continue
        })
        .await
        .unwrap();

    assert_eq!(out.len(), 101);
    let dup = out.iter().find(|c| c.id == "dup").unwrap();
    assert_eq!(dup.body, "the original");
    assert_eq!(dup.link_id, "s1");
    assert_eq!(dup.parent_id, "s1");
    let reply = out.iter().find(|c| c.id == "r1").unwrap();
    assert_eq!((reply.link_id.as_str(), reply.parent_id.as_str()), ("s1", "dup"));
    // first-seen order is kept
    assert_eq!(out[0].id, "a0");
}

/// Four failures (125/250/500/1000ms backoff, 1875ms in total) are retried silently
/// and the lookup then succeeds.
#[tokio::test(start_paused = true)]
async fn by_ids_retries_within_budget() {
    let t = ScriptedTransport::new();
    for _ in 0..4 {
        t.push_network_error();
    }
    t.push_json(json!({ "data": [comment_json("c1", "s1", 5, "hello")] }));

    let start = Instant::now();
    let found = client(t.clone()).get_comments_by_ids(&["c1"]).await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(1875));
    assert_eq!(t.urls().len(), 5);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].link_id, "s1");
    assert_eq!(query_param(&t.urls()[0], "ids").as_deref(), Some("c1"));
}

/// The fifth failure, whose backoff would pass the 2000ms budget, is surfaced as an
/// error carrying the outage hint.
#[tokio::test(start_paused = true)]
async fn by_ids_surfaces_fifth_failure() {
    let t = ScriptedTransport::new();
    for _ in 0..5 {
        t.push_network_error();
    }
    t.push_json(json!({ "data": [] }));

    let err = client(t.clone()).get_comments_by_ids(&["c1", "c2"]).await.unwrap_err();
    assert_eq!(t.urls().len(), 5, "no attempt after the budget is spent");
    assert!(matches!(err, Error::Archive { .. }));
    assert!(err.is_likely_outage());
    assert!(err.to_string().starts_with("Could not get removed comments"));
}

#[tokio::test(start_paused = true)]
async fn by_ids_with_no_ids_makes_no_request() {
    let t = ScriptedTransport::new();
    let found = client(t.clone()).get_comments_by_ids::<&str>(&[]).await.unwrap();
    assert!(found.is_empty());
    assert!(t.urls().is_empty());
}

/// Returning `Stop` from the empty batch delivered on a failure ends the session at once.
#[tokio::test(start_paused = true)]
async fn stop_during_retry_halts_requests() {
    let t = ScriptedTransport::new();
    t.push_json(page(comments_run("s1", "a", 500, 100), None));
    t.push_status(502, "bad gateway");
    t.push_json(page(comments_run("s1", "b", 700, 10), None));

    let mut calls = Vec::new();
    let out = client(t.clone())
        .get_comments("s1", CommentWindow::new(1000), |b| {
            calls.push(b.len());
            Flow::Stop
        })
        .await
        .unwrap();

    assert_eq!(calls, vec![0], "only the failure notification was delivered");
    assert_eq!(t.urls().len(), 2);
    assert_eq!(out.last_created_utc, 599);
    assert!(!out.keep_loading);
}

/// Continuing through failures keeps retrying; each failure is announced with an empty batch.
#[tokio::test(start_paused = true)]
async fn failures_are_announced_then_retried() {
    let t = ScriptedTransport::new();
    t.push_network_error();
    t.push_status(500, "oops");
    t.push_json(page(comments_run("s1", "a", 1, 3), None));

    let mut calls = Vec::new();
    let out = client(t.clone())
        .get_comments("s1", CommentWindow::new(100), |b| {
            calls.push(b.len());
            Flow::Continue
        })
        .await
        .unwrap();
    assert_eq!(calls, vec![0, 0, 3]);
    assert_eq!(out.last_created_utc, 3);
    assert!(out.keep_loading);
}

/// The newest snapshot is returned unless its body is a placeholder.
#[tokio::test(start_paused = true)]
async fn get_post_prefers_unremoved_snapshot() {
    let t = ScriptedTransport::new();
    t.push_json(json!({ "data": [
        { "id": "s1", "selftext": "[removed]", "title": "T", "created_utc": 1 },
        { "id": "s1", "selftext": "what it said", "title": "T", "created_utc": 1 }
    ]}));
    t.push_json(json!({ "data": [{ "id": "s2", "selftext": "current", "created_utc": 2 }] }));
    t.push_json(json!({ "data": [] }));
    t.push_status(500, "down");

    let c = client(t.clone());
    assert_eq!(c.get_post("s1").await.unwrap().selftext, "what it said");
    assert_eq!(c.get_post("s2").await.unwrap().selftext, "current");
    assert!(c.get_post("s3").await.is_none());
    assert!(c.get_post("s4").await.is_none(), "errors are swallowed");
    assert_eq!(query_param(&t.urls()[0], "ids").as_deref(), Some("s1"));
}

/// An archive that sends integer parent ids still yields a usable page; the ids come
/// out in base 36.
#[tokio::test(start_paused = true)]
async fn numeric_parent_ids_are_rendered_in_base36() {
    let t = ScriptedTransport::new();
    let mut reply = comment_json("c1", "s1", 10, "hello");
    reply["parent_id"] = json!(1295);
    t.push_json(page(vec![reply], None));

    let mut out: Vec<Comment> = Vec::new();
    let fetched = client(t.clone())
        .get_comments("s1", CommentWindow::new(100), |b| {
            out.extend(b);
            Flow::Continue
        })
        .await
        .unwrap();
    assert_eq!(t.urls().len(), 1, "page decoded on the first attempt");
    assert!(fetched.keep_loading);
    assert_eq!(out.len(), 1);
    assert_eq!((out[0].link_id.as_str(), out[0].parent_id.as_str()), ("s1", "zz"));
}

#[tokio::test(start_paused = true)]
async fn numeric_ids_in_by_ids_lookup() {
    let t = ScriptedTransport::new();
    let mut c = comment_json("c1", "s1", 10, "hello");
    c["parent_id"] = json!(1295);
    t.push_json(json!({ "data": [c] }));

    let found = client(t.clone()).get_comments_by_ids(&["c1"]).await.unwrap();
    assert_eq!(t.urls().len(), 1);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].parent_id, "zz");
    assert_eq!(found[0].link_id, "s1");
}

/// When a page cannot move the cursor (everything created in the cursor's second, or
/// nothing returned at all) the next request still advances `after` by one second.
#[tokio::test(start_paused = true)]
async fn cursor_advances_even_without_progress() {
    let t = ScriptedTransport::new();
    let same_second: Vec<_> = (0..100).map(|i| comment_json(&format!("a{i}"), "s1", 5000, "text")).collect();
    t.push_json(page(same_second, Some(300)));
    t.push_json(json!({ "data": [], "metadata": { "results_returned": 0, "total_results": 300 } }));
    t.push_json(json!({ "data": [], "metadata": { "results_returned": 0, "total_results": 300 } }));

    let mut delivered = 0;
    let out = client(t.clone())
        .get_comments("s1", CommentWindow::new(300).after(5000), |b| {
            delivered += b.len();
            Flow::Continue
        })
        .await
        .unwrap();

    let afters: Vec<Option<String>> = t.urls().iter().map(|u| query_param(u, "after")).collect();
    assert_eq!(afters, vec![Some("5000".into()), Some("5001".into()), Some("5002".into())]);
    assert_eq!(delivered, 100);
    assert_eq!(out.last_created_utc, 5000);
}

/// A cursor at the end of the time range stays there instead of overflowing.
#[tokio::test(start_paused = true)]
async fn cursor_saturates_at_the_largest_timestamp() {
    let t = ScriptedTransport::new();
    t.push_json(page(comments_run("s1", "a", 10, 100), Some(200)));
    t.push_json(page(vec![], Some(200)));

    client(t.clone())
        .get_comments("s1", CommentWindow::new(200).after(i64::MAX), |_| Flow::Continue)
        .await
        .unwrap();
    let max = i64::MAX.to_string();
    let afters: Vec<Option<String>> = t.urls().iter().map(|u| query_param(u, "after")).collect();
    assert_eq!(afters, vec![Some(max.clone()), Some(max)]);
}

/// Window bounds travel as query parameters; `after = 0` means no lower bound.
#[tokio::test(start_paused = true)]
async fn page_requests_carry_window_bounds() {
    let t = ScriptedTransport::new();
    t.push_json(page(vec![], None));
    t.push_json(page(vec![], None));

    let c = client(t.clone());
    c.get_comments("abc", CommentWindow::new(100), |_| Flow::Continue).await.unwrap();
    c.get_comments("abc", CommentWindow::new(100).after(1700).before(1900), |_| Flow::Continue).await.unwrap();

    let urls = t.urls();
    let first = reqwest::Url::parse(&urls[0]).unwrap();
    assert_eq!(first.path(), "/reddit/comment/search/");
    assert_eq!(query_param(&urls[0], "sort").as_deref(), Some("asc"));
    assert_eq!(query_param(&urls[0], "metadata").as_deref(), Some("true"));
    assert_eq!(query_param(&urls[0], "after"), None);
    assert_eq!(query_param(&urls[0], "before"), None);
    assert_eq!(query_param(&urls[1], "after").as_deref(), Some("1700"));
    assert_eq!(query_param(&urls[1], "before").as_deref(), Some("1900"));
}

#[test]
fn completion_prefers_reported_totals() {
    let c = PageCompletion::default();
    let meta = Metadata { total_results: Some(150), results_returned: 100 };
    assert!(!c.is_complete(Some(&meta), 100, 100));
    let meta = Metadata { total_results: Some(150), results_returned: 150 };
    assert!(c.is_complete(Some(&meta), 50, 100));
    // totals win even when the page is short
    let meta = Metadata { total_results: Some(500), results_returned: 10 };
    assert!(!c.is_complete(Some(&meta), 10, 100));
}

#[test]
fn completion_heuristic_without_totals() {
    let c = PageCompletion::default();
    let meta = Metadata { total_results: None, results_returned: 100 };
    assert!(!c.is_complete(Some(&meta), 100, 100));
    assert!(!c.is_complete(None, 50, 100));
    assert!(c.is_complete(None, 49, 100));
    assert!(PageCompletion { min_fill: 0.9 }.is_complete(None, 80, 100));
}

#[test]
fn rejects_bad_configuration() {
    let t = ScriptedTransport::new();
    let bucket = Arc::new(TokenBucket::new(Duration::from_millis(1), 1).unwrap());
    let zero = ClientOptions::default().with_chunk_size(0);
    assert!(matches!(ArchiveClient::new(t.clone(), bucket.clone(), &zero), Err(Error::InvalidArgument(_))));
    let bad = ClientOptions::default().with_archive_base_url("not a url");
    assert!(matches!(ArchiveClient::new(t, bucket, &bad), Err(Error::InvalidArgument(_))));
}
