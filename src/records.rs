//! Wire records returned by the archive service, plus the live-API item wrapper.
//! Extra fields are ignored by serde.

use crate::normalize::{to_base36, IdRef};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Archived comment. After normalization `parent_id` and `link_id` hold bare base-36 ids.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(default, deserialize_with = "id_text")]
    pub parent_id: String,
    #[serde(default, deserialize_with = "id_text")]
    pub link_id: String,
    #[serde(default, deserialize_with = "epoch")]
    pub created_utc: i64,
    #[serde(default, deserialize_with = "opt_epoch", skip_serializing_if = "Option::is_none")]
    pub retrieved_on: Option<i64>,
    #[serde(default, deserialize_with = "opt_epoch", skip_serializing_if = "Option::is_none")]
    pub retrieved_utc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
}

/// Archived submission snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub selftext: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "epoch")]
    pub created_utc: i64,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub num_comments: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    /// `false` or an edit timestamp.
    #[serde(default)]
    pub edited: Option<Value>,
    #[serde(default)]
    pub removed_by_category: Option<String>,
    #[serde(default, deserialize_with = "opt_epoch")]
    pub retrieved_on: Option<i64>,
    #[serde(default, deserialize_with = "opt_epoch")]
    pub retrieved_utc: Option<i64>,
}

/// Paging metadata (`metadata=true`). Some archives omit `total_results`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub results_returned: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// A "thing" returned by the live Reddit API. Kept as raw JSON; only the fields this
/// crate reads get accessors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveItem(pub Value);

impl LiveItem {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
    pub fn id(&self) -> Option<&str> { self.str_field("id") }
    pub fn author(&self) -> Option<&str> { self.str_field("author") }
    pub fn body(&self) -> Option<&str> { self.str_field("body") }
    pub fn selftext(&self) -> Option<&str> { self.str_field("selftext") }
    pub fn title(&self) -> Option<&str> { self.str_field("title") }
    pub fn parent_id(&self) -> Option<&str> { self.str_field("parent_id") }
    pub fn link_id(&self) -> Option<&str> { self.str_field("link_id") }
    pub fn score(&self) -> Option<i64> {
        self.0.get("score").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }
    pub fn created_utc(&self) -> Option<i64> {
        self.0.get("created_utc").and_then(epoch_from_value)
    }
}

// ----------------------------- lenient field decoding ------------------------------------

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Ids arrive as fullname strings or, from some archives, as plain integers; integers are
/// rendered in base 36. Null and anything else decode as empty.
fn id_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(|n| to_base36(IdRef::Number(n)).into_owned())
            .unwrap_or_default(),
        _ => String::new(),
    })
}

/// Archives disagree on timestamp encoding: integer, float, or numeric string.
fn epoch_from_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn epoch<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(opt_epoch(d)?.unwrap_or(0))
}

fn opt_epoch<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(epoch_from_value(&v))
}
