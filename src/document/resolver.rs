//! Document Resolver
//!
//! Reads and writes values in an execution document via parsed
//! [`DataPath`](super::DataPath) expressions. Resolution is fail-fast:
//! a missing location is a [`PathError::NotFound`], a wrong shape is a
//! [`PathError::TypeMismatch`] - paths never silently produce absent values.

use serde_json::{Map, Value};

use super::path::{DataPath, PathRoot, Segment};
use super::PathError;

/// Per-iteration context made available under the `$$` namespace.
///
/// Created by the Map composer for each spawned iteration.
#[derive(Debug, Clone)]
pub struct IterationContext {
    /// The current list element
    pub item: Value,
    /// Zero-based position of the element in the source list
    pub index: usize,
}

impl IterationContext {
    /// Resolves a context segment (`item` or `index`).
    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "item" => Some(self.item.clone()),
            "index" => Some(Value::from(self.index)),
            _ => None,
        }
    }
}

/// Resolves a path against a document, honoring the `$$` context namespace.
///
/// # Errors
///
/// * [`PathError::NotFound`] - a key or index along the path is absent
/// * [`PathError::TypeMismatch`] - a segment traverses a non-container value
/// * [`PathError::NoContext`] - a `$$` path is used where no iteration
///   context exists (outside a Map iteration)
pub fn resolve(
    doc: &Value,
    ctx: Option<&IterationContext>,
    path: &DataPath,
) -> Result<Value, PathError> {
    let mut segments = path.segments().iter();

    let mut current = match path.root() {
        PathRoot::Document => doc.clone(),
        PathRoot::Context => {
            let ctx = ctx.ok_or_else(|| PathError::NoContext(path.to_string()))?;
            match segments.next() {
                Some(Segment::Key(key)) => ctx
                    .get(key)
                    .ok_or_else(|| PathError::NotFound(path.to_string()))?,
                _ => return Err(PathError::Malformed(path.to_string())),
            }
        }
    };

    for segment in segments {
        current = match (segment, &current) {
            (Segment::Key(key), Value::Object(map)) => map
                .get(key)
                .cloned()
                .ok_or_else(|| PathError::NotFound(path.to_string()))?,
            (Segment::Key(_), other) => {
                return Err(PathError::TypeMismatch {
                    path: path.to_string(),
                    expected: "object",
                    found: type_name(other),
                })
            }
            (Segment::Index(index), Value::Array(items)) => items
                .get(*index)
                .cloned()
                .ok_or_else(|| PathError::NotFound(path.to_string()))?,
            (Segment::Index(_), other) => {
                return Err(PathError::TypeMismatch {
                    path: path.to_string(),
                    expected: "list",
                    found: type_name(other),
                })
            }
        };
    }

    Ok(current)
}

/// Writes a value into a document at the given path, returning the updated
/// document. Intermediate containers are created as needed: objects for key
/// segments, null-padded lists for index segments.
///
/// Injecting at the bare `$` root replaces the whole document. The `$$`
/// context namespace is read-only and rejected here.
pub fn inject(doc: Value, path: &DataPath, value: Value) -> Result<Value, PathError> {
    if path.root() == PathRoot::Context {
        return Err(PathError::ContextInject(path.to_string()));
    }

    if path.is_root() {
        return Ok(value);
    }

    let mut doc = doc;
    inject_at(&mut doc, path.segments(), value, path)?;
    Ok(doc)
}

fn inject_at(
    target: &mut Value,
    segments: &[Segment],
    value: Value,
    path: &DataPath,
) -> Result<(), PathError> {
    let (segment, rest) = segments.split_first().expect("inject_at requires segments");

    match segment {
        Segment::Key(key) => {
            if !target.is_object() {
                if target.is_null() {
                    *target = Value::Object(Map::new());
                } else {
                    return Err(PathError::TypeMismatch {
                        path: path.to_string(),
                        expected: "object",
                        found: type_name(target),
                    });
                }
            }
            let map = target.as_object_mut().expect("object checked above");
            let slot = map.entry(key.clone()).or_insert(Value::Null);
            if rest.is_empty() {
                *slot = value;
            } else {
                inject_at(slot, rest, value, path)?;
            }
        }
        Segment::Index(index) => {
            if !target.is_array() {
                if target.is_null() {
                    *target = Value::Array(Vec::new());
                } else {
                    return Err(PathError::TypeMismatch {
                        path: path.to_string(),
                        expected: "list",
                        found: type_name(target),
                    });
                }
            }
            let items = target.as_array_mut().expect("array checked above");
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            let slot = &mut items[*index];
            if rest.is_empty() {
                *slot = value;
            } else {
                inject_at(slot, rest, value, path)?;
            }
        }
    }

    Ok(())
}

/// Human-readable name of a JSON value's shape, for error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(expr: &str) -> DataPath {
        DataPath::parse(expr).unwrap()
    }

    #[test]
    fn test_resolve_root() {
        let doc = json!({"order": []});
        let value = resolve(&doc, None, &path("$")).unwrap();
        assert_eq!(value, doc);
    }

    #[test]
    fn test_resolve_nested() {
        let doc = json!({"order": [{"sku": "A", "qty": 2}]});
        let value = resolve(&doc, None, &path("$.order[0].sku")).unwrap();
        assert_eq!(value, json!("A"));
    }

    #[test]
    fn test_resolve_missing_key() {
        let doc = json!({"order": []});
        let result = resolve(&doc, None, &path("$.customer"));
        assert!(matches!(result, Err(PathError::NotFound(_))));
    }

    #[test]
    fn test_resolve_missing_index() {
        let doc = json!({"order": [1]});
        let result = resolve(&doc, None, &path("$.order[5]"));
        assert!(matches!(result, Err(PathError::NotFound(_))));
    }

    #[test]
    fn test_resolve_type_mismatch() {
        let doc = json!({"order": "not-a-list"});
        let result = resolve(&doc, None, &path("$.order[0]"));
        assert!(matches!(result, Err(PathError::TypeMismatch { .. })));
    }

    #[test]
    fn test_resolve_context_item() {
        let doc = json!({});
        let ctx = IterationContext {
            item: json!({"sku": "B"}),
            index: 3,
        };
        let item = resolve(&doc, Some(&ctx), &path("$$.item")).unwrap();
        assert_eq!(item, json!({"sku": "B"}));

        let index = resolve(&doc, Some(&ctx), &path("$$.index")).unwrap();
        assert_eq!(index, json!(3));

        let sku = resolve(&doc, Some(&ctx), &path("$$.item.sku")).unwrap();
        assert_eq!(sku, json!("B"));
    }

    #[test]
    fn test_resolve_context_outside_iteration() {
        let doc = json!({});
        let result = resolve(&doc, None, &path("$$.item"));
        assert!(matches!(result, Err(PathError::NoContext(_))));
    }

    #[test]
    fn test_resolve_unknown_context_key() {
        let doc = json!({});
        let ctx = IterationContext {
            item: json!(null),
            index: 0,
        };
        let result = resolve(&doc, Some(&ctx), &path("$$.other"));
        assert!(matches!(result, Err(PathError::NotFound(_))));
    }

    #[test]
    fn test_inject_replaces_root() {
        let doc = json!({"old": true});
        let out = inject(doc, &path("$"), json!({"new": true})).unwrap();
        assert_eq!(out, json!({"new": true}));
    }

    #[test]
    fn test_inject_existing_key() {
        let doc = json!({"a": 1});
        let out = inject(doc, &path("$.a"), json!(2)).unwrap();
        assert_eq!(out, json!({"a": 2}));
    }

    #[test]
    fn test_inject_creates_intermediates() {
        let doc = json!({});
        let out = inject(doc, &path("$.a.b.c"), json!(42)).unwrap();
        assert_eq!(out, json!({"a": {"b": {"c": 42}}}));
    }

    #[test]
    fn test_inject_pads_list() {
        let doc = json!({});
        let out = inject(doc, &path("$.items[2]"), json!("x")).unwrap();
        assert_eq!(out, json!({"items": [null, null, "x"]}));
    }

    #[test]
    fn test_inject_type_mismatch() {
        let doc = json!({"a": "scalar"});
        let result = inject(doc, &path("$.a.b"), json!(1));
        assert!(matches!(result, Err(PathError::TypeMismatch { .. })));
    }

    #[test]
    fn test_inject_into_context_rejected() {
        let doc = json!({});
        let result = inject(doc, &path("$$.item"), json!(1));
        assert!(matches!(result, Err(PathError::ContextInject(_))));
    }
}
