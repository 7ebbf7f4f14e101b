use anyhow::{Context, Result};
use clap::Parser;
use rethread::{
    init_tracing_once, parse_time_arg, reconcile, strip_fullname, ArchiveClient, ChunkedQueue, ClientOptions, Comment,
    CommentFilter, CommentSort, CommentWindow, Flow, LiveClient, LiveItem, NdjsonWriter, ProgressScope, Tally,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ids per live info lookup.
const LIVE_BATCH: usize = 100;

/// Recover a Reddit thread's comments from the archive and write them as NDJSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Thread id, bare (`abc123`) or fullname (`t3_abc123`)
    thread_id: String,

    /// Comment target; clamped to [chunk size, 20000]
    #[arg(long)]
    max_comments: Option<usize>,

    /// Only comments created after this time (epoch seconds, RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time_arg)]
    after: Option<i64>,

    /// Only comments created before this time
    #[arg(long, value_parser = parse_time_arg)]
    before: Option<i64>,

    /// Output file; stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    /// Render timestamps as RFC 3339 strings
    #[arg(long)]
    human_timestamps: bool,

    /// Also emit the archived submission as the first record
    #[arg(long)]
    post: bool,

    /// Compare against the live site and emit reconciled comments
    #[arg(long)]
    live: bool,

    /// With --live: which comments to keep (all, removed-deleted, removed, deleted)
    #[arg(long, default_value_t = CommentFilter::All)]
    filter: CommentFilter,

    /// With --live: ordering (top, bottom, new, old)
    #[arg(long, default_value_t = CommentSort::Old)]
    sort: CommentSort,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing_once();
    let args = Args::parse();

    match args.out.clone() {
        Some(path) => {
            let w = NdjsonWriter::create(&path).with_context(|| format!("create {}", path.display()))?;
            run(&args, w.with_human_timestamps(args.human_timestamps)).await
        }
        None => run(&args, NdjsonWriter::stdout().with_human_timestamps(args.human_timestamps)).await,
    }
}

fn progress(args: &Args, make: impl FnOnce() -> ProgressScope) -> ProgressScope {
    if args.no_progress { ProgressScope::hidden() } else { make() }
}

async fn run<W: Write>(args: &Args, mut out: NdjsonWriter<W>) -> Result<()> {
    let opts = ClientOptions::from_env();
    let thread_id = strip_fullname(args.thread_id.trim()).to_string();
    let max_comments = opts.constrain_max_comments(args.max_comments.unwrap_or_else(|| opts.default_max_comments()));

    let archive = ArchiveClient::from_options(&opts)?;

    if args.post {
        match archive.get_post(&thread_id).await {
            Some(post) => out.write_record(&post)?,
            None => tracing::warn!("No archived copy of post {}", thread_id),
        }
    }

    // Ctrl-C ends the archive session at the next callback
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut window = CommentWindow::new(max_comments).after(args.after.unwrap_or(0));
    if let Some(b) = args.before {
        window = window.before(b);
    }

    let bar = progress(args, || ProgressScope::spinner(format!("archive {thread_id}")));
    let mut comments: Vec<Comment> = Vec::new();
    let mut failures = 0u32;
    let fetched = archive
        .get_comments(&thread_id, window, |batch| {
            if batch.is_empty() {
                failures += 1;
                bar.set_message(format!("archive {thread_id} (retrying, {failures} failed requests)"));
            } else {
                bar.inc_items(batch.len() as u64);
                comments.extend(batch);
            }
            Flow::from(!stop.load(Ordering::SeqCst))
        })
        .await;
    let outcome = match fetched {
        Ok(o) => o,
        Err(e) => {
            bar.finish("archive failed");
            if let Some(url) = e.help_url() {
                tracing::error!("The archive looks unreachable; see {}", url);
            }
            return Err(e).context(format!("fetch archived comments of {thread_id}"));
        }
    };
    bar.finish(format!("{} archived comments", comments.len()));
    tracing::info!(
        "Archive session for {}: {} comments, last created_utc {}, interrupted: {}",
        thread_id, comments.len(), outcome.last_created_utc, !outcome.keep_loading
    );

    if !args.live {
        for c in &comments {
            out.write_record(c)?;
        }
    } else {
        let live = LiveClient::from_options(&opts)?;
        let live_items = fetch_live(args, &live, &comments).await;
        let mut merged = reconcile(&live_items, comments);
        let tally = Tally::of(&merged);
        tracing::info!("{}: {} comments, {} removed, {} deleted", thread_id, tally.total, tally.removed, tally.deleted);
        args.filter.apply(&mut merged);
        args.sort.apply(&mut merged);
        for c in &merged {
            out.write_record(c)?;
        }
    }

    let written = out.written();
    out.finish().context("flush output")?;
    tracing::info!("Wrote {} records", written);
    Ok(())
}

/// Live copies of the archived comments, looked up in batches. A failed batch is logged
/// and its comments are treated as archive-only.
async fn fetch_live(args: &Args, live: &LiveClient, comments: &[Comment]) -> Vec<LiveItem> {
    let mut queue = match ChunkedQueue::new(LIVE_BATCH) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("{}", e);
            return Vec::new();
        }
    };
    queue.extend(comments.iter().map(|c| c.id.clone()));

    let bar = progress(args, || ProgressScope::count("live", queue.len() as u64));
    let mut items = Vec::with_capacity(queue.len());
    while !queue.is_empty() {
        let ids = queue.pop_chunk();
        match live.get_comments(&ids).await {
            Ok(found) => items.extend(found),
            Err(e) => tracing::warn!("Live lookup of {} comments failed: {}", ids.len(), e),
        }
        bar.inc_items(ids.len() as u64);
    }
    bar.finish(format!("{} live comments", items.len()));
    items
}
