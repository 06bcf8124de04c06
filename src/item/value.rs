//! Typed property values
//!
//! Supported types:
//! - int, double, bool, string, blob
//! - reference: non-owning pointer to another object by UUID
//! - composite_reference: owning pointer; defines the persistent root's tree
//! - array: ordered collection
//! - set: unordered collection (equality ignores order)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A property value stored in an [`Item`](super::Item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Double(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Opaque bytes
    Blob(Vec<u8>),
    /// Non-owning reference
    Reference(Uuid),
    /// Owning reference
    CompositeReference(Uuid),
    /// Ordered collection
    Array(Vec<Value>),
    /// Unordered collection
    Set(ValueSet),
}

impl Value {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::Reference(_) => "reference",
            Value::CompositeReference(_) => "composite_reference",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
        }
    }

    /// Convenience constructor for string values.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Returns the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an int.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Collects every UUID this value points at, paired with whether the
    /// pointer is composite.
    pub fn references(&self) -> Vec<(Uuid, bool)> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<(Uuid, bool)>) {
        match self {
            Value::Reference(uuid) => out.push((*uuid, false)),
            Value::CompositeReference(uuid) => out.push((*uuid, true)),
            Value::Array(values) => values.iter().for_each(|v| v.collect_references(out)),
            Value::Set(set) => set.iter().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// UUIDs of the objects this value owns.
    pub fn composite_children(&self) -> Vec<Uuid> {
        self.references()
            .into_iter()
            .filter_map(|(uuid, composite)| composite.then_some(uuid))
            .collect()
    }

    /// Returns a copy with every composite reference to `child` dropped.
    ///
    /// `None` when the value was nothing but that reference.
    pub fn without_composite(&self, child: Uuid) -> Option<Value> {
        let target = Value::CompositeReference(child);
        match self {
            Value::CompositeReference(uuid) if *uuid == child => None,
            Value::Array(values) => Some(Value::Array(
                values.iter().filter(|v| **v != target).cloned().collect(),
            )),
            Value::Set(set) => Some(Value::Set(ValueSet::from_values(
                set.iter().filter(|v| **v != target).cloned(),
            ))),
            other => Some(other.clone()),
        }
    }

    /// Returns a copy with every reference passed through `remap`.
    ///
    /// `remap` receives the UUID and whether the reference is composite.
    pub fn map_references<F>(&self, remap: &F) -> Value
    where
        F: Fn(Uuid, bool) -> Uuid,
    {
        match self {
            Value::Reference(uuid) => Value::Reference(remap(*uuid, false)),
            Value::CompositeReference(uuid) => Value::CompositeReference(remap(*uuid, true)),
            Value::Array(values) => {
                Value::Array(values.iter().map(|v| v.map_references(remap)).collect())
            }
            Value::Set(set) => Value::Set(ValueSet::from_values(
                set.iter().map(|v| v.map_references(remap)),
            )),
            other => other.clone(),
        }
    }
}

/// Unordered collection of values without duplicates.
///
/// Equality is set equality: order of insertion is irrelevant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet(Vec<Value>);

impl ValueSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a set, dropping duplicates.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut set = Self::new();
        for value in values {
            set.insert(value);
        }
        set
    }

    /// Inserts a value. Returns false if it was already present.
    pub fn insert(&mut self, value: Value) -> bool {
        if self.contains(&value) {
            return false;
        }
        self.0.push(value);
        true
    }

    /// Removes a value. Returns false if it was absent.
    pub fn remove(&mut self, value: &Value) -> bool {
        match self.0.iter().position(|v| v == value) {
            Some(index) => {
                self.0.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the set holds `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.0.iter().any(|v| v == value)
    }

    /// Number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates members in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}
