//! Schema drift detection.
//!
//! The remote owns the record schema. When the shape of what it sends stops
//! matching what is stored locally, the local copy of that collection is
//! thrown away and pulled again from scratch.

use crate::{record::ENGINE_FIELDS, CollectionSpec, Record};
use serde_json::Value;
use std::collections::BTreeSet;

/// The set of top-level field names of a record value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape(BTreeSet<String>);

impl Shape {
    pub fn of(value: &Value) -> Self {
        match value.as_object() {
            Some(map) => Self(map.keys().cloned().collect()),
            None => Self::default(),
        }
    }

    /// The shape minus the fields the engine may write on its own: sync
    /// bookkeeping, the primary key and the timestamp.
    pub fn in_collection(spec: &CollectionSpec, value: &Value) -> Self {
        let mut shape = Self::of(value);
        for field in ENGINE_FIELDS {
            shape.0.remove(field);
        }
        for path in [&spec.primary_key_field, &spec.timestamp_field] {
            if let Some(top) = path.segments().first() {
                shape.0.remove(top);
            }
        }
        shape
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Compare the first stored record against the first pulled one.
///
/// Either side missing means there is nothing to compare, so no drift.
pub fn has_drifted(spec: &CollectionSpec, stored: Option<&Record>, pulled: Option<&Value>) -> bool {
    match (stored, pulled) {
        (Some(stored), Some(pulled)) => {
            Shape::in_collection(spec, &stored.value) != Shape::in_collection(spec, pulled)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CollectionDecl;
    use serde_json::json;

    fn spec() -> CollectionSpec {
        CollectionDecl::new("todos", "id", "meta.updatedAt", "r", "c")
            .validate()
            .unwrap()
    }

    #[test]
    fn shape_ignores_values_and_order() {
        assert_eq!(
            Shape::of(&json!({"a": 1, "b": 2})),
            Shape::of(&json!({"b": "x", "a": null}))
        );
        assert_ne!(Shape::of(&json!({"a": 1})), Shape::of(&json!({"a": 1, "c": 3})));
    }

    #[test]
    fn non_objects_have_empty_shape() {
        assert_eq!(Shape::of(&json!([1, 2])).fields().count(), 0);
    }

    #[test]
    fn drift_needs_both_sides() {
        let spec = spec();
        let stored = Record::synced(json!({"id": "a", "title": "t"}));
        assert!(!has_drifted(&spec, None, Some(&json!({"id": "b"}))));
        assert!(!has_drifted(&spec, Some(&stored), None));
        assert!(!has_drifted(&spec, Some(&stored), Some(&json!({"id": "b", "title": "u"}))));
        assert!(has_drifted(&spec, Some(&stored), Some(&json!({"id": "b", "name": "u"}))));
    }

    #[test]
    fn engine_written_fields_do_not_count_as_drift() {
        let spec = spec();
        let stored = Record::synced(json!({"id": "a", "title": "t", "meta": {"updatedAt": 5}}));
        let pulled = json!({"title": "u", "syncState": 1});
        assert!(!has_drifted(&spec, Some(&stored), Some(&pulled)));
        assert_eq!(
            Shape::in_collection(&spec, &stored.value).fields().collect::<Vec<_>>(),
            vec!["title"]
        );
    }
}
