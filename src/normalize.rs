//! Identifier translation and "best version" reconciliation of duplicate records.

use crate::records::Comment;
use ahash::AHashMap;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

pub const DELETED: &str = "[deleted]";
pub const REMOVED: &str = "[removed]";

/// An identifier as it appears in API payloads: a (possibly prefixed) string or a number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdRef<'a> {
    Text(&'a str),
    Number(u64),
}

/// Reduces a fullname (`t1_abc`, `t3_xyz`) to its bare id and renders numeric ids in
/// base 36. Empty strings and `0` come back unchanged.
pub fn to_base36(id: IdRef<'_>) -> Cow<'_, str> {
    match id {
        IdRef::Text(s) => Cow::Borrowed(strip_fullname(s)),
        IdRef::Number(0) => Cow::Borrowed("0"),
        IdRef::Number(n) => Cow::Owned(base36(n)),
    }
}

/// Drops a 2-character type tag plus underscore, when present.
pub fn strip_fullname(id: &str) -> &str {
    if id.as_bytes().get(2) == Some(&b'_') { &id[3..] } else { id }
}

pub fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Literal placeholder the primary service substitutes for taken-down text.
pub fn is_placeholder(body: &str) -> bool {
    body == DELETED || body == REMOVED
}

/// Deleted by the author. The escaped form is how the live API renders it in markdown.
pub fn is_deleted(text: &str) -> bool {
    text == DELETED || text == "\\[deleted\\]"
}

/// Removed by moderators or the platform.
pub fn is_removed(text: &str) -> bool {
    text == REMOVED || text == "\\[removed\\]" || text == "[ Removed by Reddit ]"
}

/// Looser check for removal notices such as `[ Deleted By User ]`: bracketed,
/// at most 100 characters, mentioning "deleted" or "removed".
pub fn looks_like_removal_notice(text: &str) -> bool {
    static NOTICE: OnceLock<Regex> = OnceLock::new();
    let re = NOTICE.get_or_init(|| Regex::new(r"(?is)^\[.*(deleted|removed).*\]$").expect("static regex"));
    text.len() <= 100 && re.is_match(text)
}

/// Merge rule: keep the existing record unless it is a placeholder and the incoming one
/// is not.
pub fn prefers_incoming(existing: &Comment, incoming: &Comment) -> bool {
    is_placeholder(&existing.body) && !is_placeholder(&incoming.body)
}

impl Comment {
    /// Strips fullname prefixes from `link_id`/`parent_id`. A missing link id falls back to
    /// `thread_fallback`; a missing parent id falls back to the (normalized) link id.
    pub fn normalize_ids(&mut self, thread_fallback: Option<&str>) {
        let link = strip_fullname(&self.link_id);
        let link = if link.is_empty() { thread_fallback.unwrap_or_default() } else { link };
        self.link_id = link.to_string();

        let parent = strip_fullname(&self.parent_id);
        self.parent_id = if parent.is_empty() { self.link_id.clone() } else { parent.to_string() };
    }
}

/// Insertion-ordered, id-keyed set of comments applying the merge rule on insert.
#[derive(Clone, Debug, Default)]
pub struct CommentSet {
    index: AHashMap<String, usize>,
    items: Vec<Comment>,
}

impl CommentSet {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(n: usize) -> Self {
        Self { index: AHashMap::with_capacity(n), items: Vec::with_capacity(n) }
    }

    /// Returns true when the comment was stored (new id, or it replaced a placeholder).
    pub fn insert(&mut self, comment: Comment) -> bool {
        match self.index.get(&comment.id) {
            Some(&i) => {
                if prefers_incoming(&self.items[i], &comment) {
                    self.items[i] = comment;
                    true
                } else {
                    false
                }
            }
            None => {
                self.index.insert(comment.id.clone(), self.items.len());
                self.items.push(comment);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Comment> {
        self.index.get(id).map(|&i| &self.items[i])
    }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, Comment> { self.items.iter() }
    pub fn into_vec(self) -> Vec<Comment> { self.items }
}

impl Extend<Comment> for CommentSet {
    fn extend<I: IntoIterator<Item = Comment>>(&mut self, iter: I) {
        for c in iter {
            self.insert(c);
        }
    }
}

impl FromIterator<Comment> for CommentSet {
    fn from_iter<I: IntoIterator<Item = Comment>>(iter: I) -> Self {
        let mut set = CommentSet::new();
        set.extend(iter);
        set
    }
}
