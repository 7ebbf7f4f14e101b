//! Joins archived comments with their live counterparts and flags what changed.

use crate::normalize::{is_deleted, is_placeholder, is_removed, strip_fullname};
use crate::records::{Comment, LiveItem};
use ahash::AHashMap;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One comment of a thread as seen through both sources.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ThreadComment {
    pub id: String,
    pub parent_id: String,
    pub link_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Best readable text: live when real, otherwise archived.
    pub body: String,
    /// Text as first archived, when the archive has it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    pub created_utc: i64,
    pub removed: bool,
    pub deleted: bool,
    pub edited: bool,
    pub archived_only: bool,
}

fn is_real(text: &str) -> bool {
    !is_placeholder(text) && !is_removed(text) && !is_deleted(text)
}

fn bracketed(s: &str) -> bool {
    s.starts_with('[') && s.ends_with(']')
}

fn merge(archived: Option<Comment>, live: Option<&LiveItem>) -> Option<ThreadComment> {
    let live_text = live.and_then(|l| l.body().or_else(|| l.selftext()));
    let judged = live_text.or(archived.as_ref().map(|c| c.body.as_str()))?;
    let removed = is_removed(judged);
    let deleted = is_deleted(judged);

    let archived_body = archived.as_ref().map(|c| c.body.clone());
    let body = match (live_text, archived_body.as_deref()) {
        (Some(l), _) if is_real(l) => l.to_string(),
        (_, Some(a)) if is_real(a) => a.to_string(),
        (Some(l), _) => l.to_string(),
        (None, a) => a.unwrap_or_default().to_string(),
    };
    let edited = match (live_text, archived_body.as_deref()) {
        (Some(l), Some(a)) => is_real(l) && is_real(a) && l != a,
        _ => false,
    };

    let live_author = live.and_then(|l| l.author()).filter(|a| !bracketed(a));
    let author = live_author
        .map(str::to_string)
        .or_else(|| archived.as_ref().and_then(|c| c.author.clone()))
        .or_else(|| live.and_then(|l| l.author()).map(str::to_string));

    let id_of = |s: Option<&str>| s.map(|v| strip_fullname(v).to_string()).unwrap_or_default();
    let (id, link_id, mut parent_id, created_utc, archived_score) = match archived {
        Some(c) => (c.id, c.link_id, c.parent_id, c.created_utc, c.score),
        None => {
            let l = live?;
            (
                id_of(l.id()),
                id_of(l.link_id()),
                id_of(l.parent_id()),
                l.created_utc().unwrap_or(0),
                None,
            )
        }
    };
    if parent_id.is_empty() {
        parent_id = link_id.clone();
    }

    Some(ThreadComment {
        id,
        parent_id,
        link_id,
        author,
        body,
        archived_body,
        score: live.and_then(LiveItem::score).or(archived_score),
        created_utc,
        removed,
        deleted,
        edited,
        archived_only: live.is_none(),
    })
}

/// One entry per id seen in either source: archived comments first (in their order),
/// then comments only the live API knows about.
pub fn reconcile(live: &[LiveItem], archived: Vec<Comment>) -> Vec<ThreadComment> {
    let by_id: AHashMap<&str, &LiveItem> = live.iter().filter_map(|l| l.id().map(|id| (id, l))).collect();
    let mut out = Vec::with_capacity(archived.len().max(live.len()));
    let mut seen: ahash::AHashSet<String> = ahash::AHashSet::with_capacity(archived.len());

    for c in archived {
        if !seen.insert(c.id.clone()) {
            continue;
        }
        let l = by_id.get(c.id.as_str()).copied();
        out.extend(merge(Some(c), l));
    }
    for l in live {
        let Some(id) = l.id() else { continue };
        if seen.insert(id.to_string()) {
            out.extend(merge(None, Some(l)));
        }
    }
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommentFilter {
    All,
    #[default]
    RemovedDeleted,
    Removed,
    Deleted,
}

impl CommentFilter {
    pub fn matches(self, c: &ThreadComment) -> bool {
        match self {
            CommentFilter::All => true,
            CommentFilter::RemovedDeleted => c.removed || c.deleted,
            CommentFilter::Removed => c.removed,
            CommentFilter::Deleted => c.deleted,
        }
    }

    pub fn apply(self, comments: &mut Vec<ThreadComment>) {
        comments.retain(|c| self.matches(c));
    }
}

impl FromStr for CommentFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CommentFilter::All),
            "removed-deleted" | "removed_deleted" => Ok(CommentFilter::RemovedDeleted),
            "removed" => Ok(CommentFilter::Removed),
            "deleted" => Ok(CommentFilter::Deleted),
            other => Err(format!("unknown filter {other:?} (all, removed-deleted, removed, deleted)")),
        }
    }
}

impl fmt::Display for CommentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommentFilter::All => "all",
            CommentFilter::RemovedDeleted => "removed-deleted",
            CommentFilter::Removed => "removed",
            CommentFilter::Deleted => "deleted",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommentSort {
    #[default]
    Top,
    Bottom,
    New,
    Old,
}

impl CommentSort {
    /// Stable; a missing score counts as 0.
    pub fn apply(self, comments: &mut [ThreadComment]) {
        let score = |c: &ThreadComment| c.score.unwrap_or(0);
        match self {
            CommentSort::Top => comments.sort_by_key(|c| std::cmp::Reverse(score(c))),
            CommentSort::Bottom => comments.sort_by_key(score),
            CommentSort::New => comments.sort_by_key(|c| std::cmp::Reverse(c.created_utc)),
            CommentSort::Old => comments.sort_by_key(|c| c.created_utc),
        }
    }
}

impl FromStr for CommentSort {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(CommentSort::Top),
            "bottom" => Ok(CommentSort::Bottom),
            "new" => Ok(CommentSort::New),
            "old" => Ok(CommentSort::Old),
            other => Err(format!("unknown sort {other:?} (top, bottom, new, old)")),
        }
    }
}

impl fmt::Display for CommentSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommentSort::Top => "top",
            CommentSort::Bottom => "bottom",
            CommentSort::New => "new",
            CommentSort::Old => "old",
        })
    }
}

/// Removed/deleted counts for a reconciled thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub removed: usize,
    pub deleted: usize,
}

impl Tally {
    pub fn of(comments: &[ThreadComment]) -> Self {
        comments.iter().fold(Tally::default(), |mut t, c| {
            t.total += 1;
            t.removed += c.removed as usize;
            t.deleted += c.deleted as usize;
            t
        })
    }
}
