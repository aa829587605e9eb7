//! Placeholder substitution.
//!
//! When a silent submission succeeds, its virtual response tree is paired
//! structurally against the real response to produce a substitution map of
//! placeholder id to resolved value. The map is then deep-applied to the
//! remaining queued descriptors, regenerate arguments, and live state:
//! tagged placeholder nodes are replaced wholesale, and id-shaped substrings
//! inside strings (URLs, query strings) are rewritten textually.

use crate::placeholder::value::tagged_id;
use crate::placeholder::{PathSegment, PlaceholderValue};
use crate::request::RequestDescriptor;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

pub type SubstitutionMap = HashMap<String, Value>;

static ID_PATTERN: OnceLock<regex::Regex> = OnceLock::new();

fn id_pattern() -> &'static regex::Regex {
    ID_PATTERN.get_or_init(|| regex::Regex::new(r"vd_[0-9a-f]{32}").expect("static pattern"))
}

/// Pair the placeholder tree rooted at a record's virtual response against
/// the real response. Same key path pairs up; a path the response lacks
/// resolves to `null`.
pub fn pair_virtual_response(root: &PlaceholderValue, response: &Value) -> SubstitutionMap {
    let mut map = SubstitutionMap::new();
    collect_pairs(root, Some(response.clone()), &mut map);
    map
}

fn collect_pairs(placeholder: &PlaceholderValue, real: Option<Value>, map: &mut SubstitutionMap) {
    let real = real.unwrap_or(Value::Null);
    map.insert(placeholder.raw_id().to_string(), real.clone());
    for (segment, child) in placeholder.children() {
        let sub = match &segment {
            PathSegment::Key(key) => real.get(key).cloned(),
            PathSegment::Index(idx) => real.get(idx).cloned(),
        };
        collect_pairs(&child, sub, map);
    }
}

/// Deep-apply a substitution map to a JSON tree in place.
pub fn apply_to_value(value: &mut Value, map: &SubstitutionMap) {
    if let Some(id) = tagged_id(value) {
        if let Some(real) = map.get(id) {
            *value = real.clone();
        }
        // An unresolved tagged node stays put for a later pass.
        return;
    }
    match value {
        Value::String(s) => {
            if let Some(rewritten) = rewrite_string(s, map) {
                *value = rewritten;
            }
        }
        Value::Array(items) => {
            for item in items {
                apply_to_value(item, map);
            }
        }
        Value::Object(fields) => {
            for (_, field) in fields.iter_mut() {
                apply_to_value(field, map);
            }
        }
        _ => {}
    }
}

/// Rewrite placeholder-id substrings inside one string. A string that is
/// exactly one resolved id becomes the resolved value itself, preserving its
/// type; otherwise matched ids are spliced in textually.
fn rewrite_string(s: &str, map: &SubstitutionMap) -> Option<Value> {
    if let Some(real) = map.get(s) {
        return Some(real.clone());
    }
    if !id_pattern().is_match(s) {
        return None;
    }
    let mut changed = false;
    let rewritten = id_pattern().replace_all(s, |caps: &regex::Captures<'_>| {
        let id = caps.get(0).expect("match").as_str();
        match map.get(id) {
            Some(real) => {
                changed = true;
                render_scalar(real)
            }
            None => id.to_string(),
        }
    });
    changed.then(|| Value::String(rewritten.into_owned()))
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Apply a substitution map to a request descriptor's URL, config, and body.
pub fn apply_to_descriptor(descriptor: &mut RequestDescriptor, map: &SubstitutionMap) {
    if let Some(Value::String(url)) = rewrite_string(&descriptor.url, map).map(normalize_url) {
        descriptor.url = url;
    }
    apply_to_value(&mut descriptor.config, map);
    apply_to_value(&mut descriptor.body, map);
}

// URL rewrites always stay strings even when the whole URL was one id.
fn normalize_url(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        other => Value::String(render_scalar(&other)),
    }
}

/// Every placeholder id referenced anywhere in a JSON tree, tagged or
/// id-shaped inside strings.
pub fn scan_placeholder_ids(value: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    scan(value, &mut ids);
    ids
}

fn scan(value: &Value, ids: &mut Vec<String>) {
    if let Some(id) = tagged_id(value) {
        push_unique(ids, id);
        return;
    }
    match value {
        Value::String(s) => {
            for m in id_pattern().find_iter(s) {
                push_unique(ids, m.as_str());
            }
        }
        Value::Array(items) => {
            for item in items {
                scan(item, ids);
            }
        }
        Value::Object(fields) => {
            for (_, field) in fields {
                scan(field, ids);
            }
        }
        _ => {}
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}
