//! Path queries over JSON documents.
//!
//! Supports the common subset of gjson paths: dotted keys, numeric array
//! indices, `#` for array length, `a.#.b` projection over arrays, `\.`
//! escapes and `*`/`?` key wildcards.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum PatternChar {
    Literal(char),
    Star,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    key: String,
    /// Set when the key holds an unescaped wildcard.
    pattern: Option<Vec<PatternChar>>,
}

fn split_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut pattern = Vec::new();
    let mut wildcard = false;
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    key.push(escaped);
                    pattern.push(PatternChar::Literal(escaped));
                }
            }
            '.' => {
                segments.push(Segment {
                    key: std::mem::take(&mut key),
                    pattern: wildcard.then(|| std::mem::take(&mut pattern)),
                });
                pattern.clear();
                wildcard = false;
            }
            '*' => {
                key.push(c);
                pattern.push(PatternChar::Star);
                wildcard = true;
            }
            '?' => {
                key.push(c);
                pattern.push(PatternChar::Any);
                wildcard = true;
            }
            _ => {
                key.push(c);
                pattern.push(PatternChar::Literal(c));
            }
        }
    }

    segments.push(Segment {
        key,
        pattern: wildcard.then_some(pattern),
    });
    segments
}

fn wildcard_match(pattern: &[PatternChar], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((PatternChar::Star, rest)) => {
            (0..=text.len()).any(|i| wildcard_match(rest, &text[i..]))
        }
        Some((PatternChar::Any, rest)) => !text.is_empty() && wildcard_match(rest, &text[1..]),
        Some((PatternChar::Literal(c), rest)) => {
            text.first() == Some(c) && wildcard_match(rest, &text[1..])
        }
    }
}

fn resolve(value: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    match value {
        Value::Array(items) if segment.key == "#" && segment.pattern.is_none() => {
            if rest.is_empty() {
                return Some(Value::from(items.len()));
            }
            let projected: Vec<Value> = items.iter().filter_map(|item| resolve(item, rest)).collect();
            Some(Value::Array(projected))
        }
        Value::Array(items) => {
            let index: usize = segment.key.parse().ok()?;
            resolve(items.get(index)?, rest)
        }
        Value::Object(map) => match &segment.pattern {
            Some(pattern) => map.iter().find_map(|(k, v)| {
                let chars: Vec<char> = k.chars().collect();
                if wildcard_match(pattern, &chars) {
                    resolve(v, rest)
                } else {
                    None
                }
            }),
            None => resolve(map.get(&segment.key)?, rest),
        },
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Evaluate `path` against `doc`.
///
/// Arrays yield one string per element, scalars one string. A missing path
/// or `null` yields nothing.
pub fn query(doc: &Value, path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    match resolve(doc, &split_path(path)) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(other) => vec![value_text(&other)],
    }
}
