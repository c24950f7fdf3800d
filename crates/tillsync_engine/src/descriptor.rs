//! Per-entity-type sync descriptors.

use crate::record::EntityType;
use serde_json::{Map, Value};
use std::fmt;

/// Static sync configuration of one entity type.
///
/// Descriptors turn per-entity special cases into data: which endpoint the
/// records go to, which fields must never be transmitted, and which fields
/// reference records of other entity types.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Entity type name.
    pub entity_type: EntityType,
    /// Remote endpoint (shared endpoints are grouped into one batch).
    pub endpoint: String,
    /// Fields removed from every outbound item.
    pub strip_fields: Vec<FieldPath>,
    /// Fields holding identities of other records.
    pub foreign_keys: Vec<ForeignKey>,
}

impl EntityDescriptor {
    /// Creates a descriptor with no stripped fields or foreign keys.
    pub fn new(entity_type: impl Into<EntityType>, endpoint: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            endpoint: endpoint.into(),
            strip_fields: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Strips a field from outbound items.
    pub fn strip(mut self, path: &str) -> Self {
        self.strip_fields.push(FieldPath::parse(path));
        self
    }

    /// Declares a foreign key.
    pub fn foreign_key(mut self, path: &str, target: impl Into<EntityType>) -> Self {
        self.foreign_keys.push(ForeignKey {
            path: FieldPath::parse(path),
            target: target.into(),
        });
        self
    }

    /// Returns true if `entity` is referenced by one of this descriptor's keys.
    pub fn depends_on(&self, entity: &EntityType) -> bool {
        self.foreign_keys.iter().any(|fk| &fk.target == entity)
    }
}

/// A reference from a field to records of another entity type.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Location of the reference inside the payload.
    pub path: FieldPath,
    /// Entity type the reference points at.
    pub target: EntityType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Each(String),
}

/// A dotted path into a record payload.
///
/// `customerId` names a top-level field, `items[].productId` names the
/// `productId` of every element of the `items` array.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parses a path.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_suffix("[]") {
                Some(name) => Segment::Each(name.to_string()),
                None => Segment::Key(s.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// Returns the path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Calls `f` with every value at this path.
    pub fn visit<F: FnMut(&Value)>(&self, fields: &Map<String, Value>, f: &mut F) {
        visit_map(fields, &self.segments, f);
    }

    /// Calls `f` with every value at this path, mutably.
    pub fn visit_mut<F: FnMut(&mut Value)>(&self, fields: &mut Map<String, Value>, f: &mut F) {
        visit_map_mut(fields, &self.segments, f);
    }

    /// Removes values at this path for which `pred` holds.
    ///
    /// Object fields are removed; elements of a trailing `[]` segment are
    /// dropped from their array. Returns the number of removed values.
    pub fn remove_where<P: Fn(&Value) -> bool>(
        &self,
        fields: &mut Map<String, Value>,
        pred: &P,
    ) -> usize {
        remove_in_map(fields, &self.segments, pred)
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({})", self.raw)
    }
}

fn visit_map<F: FnMut(&Value)>(map: &Map<String, Value>, segments: &[Segment], f: &mut F) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    match first {
        Segment::Key(name) => {
            if let Some(value) = map.get(name) {
                visit_value(value, rest, f);
            }
        }
        Segment::Each(name) => {
            if let Some(Value::Array(items)) = map.get(name) {
                for item in items {
                    visit_value(item, rest, f);
                }
            }
        }
    }
}

fn visit_value<F: FnMut(&Value)>(value: &Value, rest: &[Segment], f: &mut F) {
    if rest.is_empty() {
        f(value);
    } else if let Value::Object(inner) = value {
        visit_map(inner, rest, f);
    }
}

fn visit_map_mut<F: FnMut(&mut Value)>(
    map: &mut Map<String, Value>,
    segments: &[Segment],
    f: &mut F,
) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    match first {
        Segment::Key(name) => {
            if let Some(value) = map.get_mut(name) {
                visit_value_mut(value, rest, f);
            }
        }
        Segment::Each(name) => {
            if let Some(Value::Array(items)) = map.get_mut(name) {
                for item in items.iter_mut() {
                    visit_value_mut(item, rest, f);
                }
            }
        }
    }
}

fn visit_value_mut<F: FnMut(&mut Value)>(value: &mut Value, rest: &[Segment], f: &mut F) {
    if rest.is_empty() {
        f(value);
    } else if let Value::Object(inner) = value {
        visit_map_mut(inner, rest, f);
    }
}

fn remove_in_map<P: Fn(&Value) -> bool>(
    map: &mut Map<String, Value>,
    segments: &[Segment],
    pred: &P,
) -> usize {
    let Some((first, rest)) = segments.split_first() else {
        return 0;
    };
    match first {
        Segment::Key(name) if rest.is_empty() => match map.get(name) {
            Some(value) if pred(value) => {
                map.remove(name);
                1
            }
            _ => 0,
        },
        Segment::Key(name) => match map.get_mut(name) {
            Some(Value::Object(inner)) => remove_in_map(inner, rest, pred),
            _ => 0,
        },
        Segment::Each(name) => {
            let Some(Value::Array(items)) = map.get_mut(name) else {
                return 0;
            };
            if rest.is_empty() {
                let before = items.len();
                items.retain(|item| !pred(item));
                before - items.len()
            } else {
                items
                    .iter_mut()
                    .filter_map(|item| match item {
                        Value::Object(inner) => Some(remove_in_map(inner, rest, pred)),
                        _ => None,
                    })
                    .sum()
            }
        }
    }
}
