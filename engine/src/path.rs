//! Path helpers over JSON trees.
//!
//! Records address their fields with dotted paths (`stats.level`), the remote
//! store with slash-delimited paths (`players/-Nabc/stats/level`). Both are
//! split into segments here; empty segments are ignored.

use serde_json::{Map, Value};

/// Split a dotted record path into segments.
pub fn dotted(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Split a slash-delimited remote path into segments.
pub fn slashed(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join segments into a slash-delimited remote path.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Append a child path to a parent remote path.
pub fn child(parent: &str, child: &str) -> String {
    let mut segments = slashed(parent);
    segments.extend(slashed(child));
    join(&segments)
}

/// Read the value at `segments` below `root`.
pub fn get<'a>(root: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = root.get(*first)?;
    for segment in rest {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// Write `value` at `segments` below `root`, creating intermediate objects.
///
/// Intermediate values that are not objects are replaced.
pub fn set(root: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.to_string(), value);
}

/// Remove the value at `segments` below `root`, returning it.
pub fn remove(root: &mut Map<String, Value>, segments: &[&str]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut current = root;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    current.remove(*last)
}

/// Normalise a value to what the remote store keeps: `null` leaves and empty
/// objects disappear. Returns `None` when nothing is left.
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(key, value)| prune(value).map(|value| (key, value)))
                .collect();
            (!pruned.is_empty()).then_some(Value::Object(pruned))
        }
        other => Some(other),
    }
}

/// Name of a JSON value's type, as reported in validation errors.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn split_paths() {
        assert_eq!(dotted("stats.level"), vec!["stats", "level"]);
        assert_eq!(dotted(".a..b."), vec!["a", "b"]);
        assert_eq!(slashed("/players/p1/"), vec!["players", "p1"]);
        assert_eq!(child("players", "p1/name"), "players/p1/name");
        assert_eq!(child("", "players"), "players");
    }

    #[test]
    fn get_nested() {
        let root = object(json!({"stats": {"level": 3}, "name": "Jorge"}));
        assert_eq!(get(&root, &["stats", "level"]), Some(&json!(3)));
        assert_eq!(get(&root, &["name", "first"]), None);
        assert_eq!(get(&root, &[]), None);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut root = object(json!({"name": "Jorge"}));
        set(&mut root, &["friends", "bob"], json!("Bob"));
        set(&mut root, &["name", "first"], json!("J"));
        assert_eq!(
            Value::Object(root),
            json!({"name": {"first": "J"}, "friends": {"bob": "Bob"}})
        );
    }

    #[test]
    fn remove_nested() {
        let mut root = object(json!({"friends": {"bob": "Bob"}}));
        assert_eq!(remove(&mut root, &["friends", "bob"]), Some(json!("Bob")));
        assert_eq!(remove(&mut root, &["friends", "bob"]), None);
        assert_eq!(remove(&mut root, &["missing", "x"]), None);
        assert_eq!(Value::Object(root), json!({"friends": {}}));
    }

    #[test]
    fn prune_drops_nulls_and_empty_objects() {
        assert_eq!(prune(json!(null)), None);
        assert_eq!(prune(json!({})), None);
        assert_eq!(prune(json!({"a": {"b": null}, "c": {}})), None);
        assert_eq!(
            prune(json!({"a": 1, "b": {"c": null, "d": [null]}, "e": {}})),
            Some(json!({"a": 1, "b": {"d": [null]}}))
        );
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(&json!(null)), "null");
        assert_eq!(type_name(&json!(1.5)), "number");
        assert_eq!(type_name(&json!([1])), "array");
    }
}
