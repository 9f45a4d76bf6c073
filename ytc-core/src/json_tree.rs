//! Schema-agnostic search over decoded JSON trees.
//!
//! Upstream pages nest the interesting objects at depths that change between page
//! kinds and releases, so callers look subtrees up by key instead of by path.
//! Traversal is depth-first: object entries in encounter order, array elements in
//! index order. A matching entry is yielded and its value is not searched further.

use serde_json::map;
use serde_json::Value;

use crate::harvest::{HarvestError, HarvestResult};

enum Frame<'a> {
    Object(map::Iter<'a>),
    Array(std::slice::Iter<'a, Value>),
}

impl<'a> Frame<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Object(entries) => Some(Frame::Object(entries.iter())),
            Value::Array(items) => Some(Frame::Array(items.iter())),
            _ => None,
        }
    }
}

/// Lazy iterator over every subtree whose `(key, value)` pair satisfies the predicate.
pub struct Matches<'a, P> {
    stack: Vec<Frame<'a>>,
    predicate: P,
}

impl<'a, P> Iterator for Matches<'a, P>
where
    P: FnMut(&str, &Value) -> bool,
{
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        loop {
            let step = match self.stack.last_mut()? {
                Frame::Object(entries) => entries
                    .next()
                    .map(|(key, value)| (Some(key.as_str()), value)),
                Frame::Array(items) => items.next().map(|value| (None, value)),
            };
            match step {
                None => {
                    self.stack.pop();
                }
                Some((key, value)) => {
                    if let Some(key) = key {
                        if (self.predicate)(key, value) {
                            return Some(value);
                        }
                    }
                    if let Some(frame) = Frame::of(value) {
                        self.stack.push(frame);
                    }
                }
            }
        }
    }
}

pub fn find_all<P>(root: &Value, predicate: P) -> Matches<'_, P>
where
    P: FnMut(&str, &Value) -> bool,
{
    Matches {
        stack: Frame::of(root).into_iter().collect(),
        predicate,
    }
}

pub fn find_first<P>(root: &Value, predicate: P) -> Option<&Value>
where
    P: FnMut(&str, &Value) -> bool,
{
    find_all(root, predicate).next()
}

/// All values stored under `key`, at any depth.
pub fn search_key<'a>(root: &'a Value, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    find_all(root, move |candidate, _| candidate == key)
}

pub fn first_key<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    find_first(root, |candidate, _| candidate == key)
}

/// Decodes a root document. Only an undecodable root is an error; lookups that
/// find nothing return empty results.
pub fn decode(text: &str) -> HarvestResult<Value> {
    serde_json::from_str(text)
        .map_err(|err| HarvestError::Parse(format!("undecodable json document: {err}")))
}

/// Reads the display text of a `simpleText`/`runs`/`content` text object or a plain string.
pub fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => {
            if let Some(text) = fields.get("simpleText").and_then(Value::as_str) {
                return Some(text.to_string());
            }
            if let Some(runs) = fields.get("runs").and_then(Value::as_array) {
                let joined = runs
                    .iter()
                    .filter_map(|run| run.get("text").and_then(Value::as_str))
                    .collect::<String>();
                return Some(joined);
            }
            fields.get("content").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    }
}
