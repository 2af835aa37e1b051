//! Immutable state values.
//!
//! Every slice in the state table is an [`Immutable`]: a shared JSON value that
//! is never mutated in place. The helpers below return new values and leave the
//! receiver untouched, so a transition can hand back either the value it was
//! given (no change) or a freshly built one.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A shared, never-mutated JSON value.
#[derive(Clone)]
pub struct Immutable(Arc<Value>);

impl Immutable {
    /// Wrap a plain value.
    pub fn new(value: Value) -> Self {
        Immutable(Arc::new(value))
    }

    /// An empty object, the slice a store gets when it has no initial state.
    pub fn empty_map() -> Self {
        Immutable::new(Value::Object(Map::new()))
    }

    /// Deep-convert any serializable value.
    pub fn from_plain<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Immutable::new(serde_json::to_value(value)?))
    }

    /// Plain projection of the value (a deep copy).
    pub fn to_plain(&self) -> Value {
        (*self.0).clone()
    }

    /// Deserialize into a typed value.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&*self.0)?)
    }

    /// Borrow the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// True if both handles share the same allocation.
    pub fn ptr_eq(a: &Immutable, b: &Immutable) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Field of an object.
    pub fn get(&self, key: &str) -> Option<Immutable> {
        self.0.get(key).cloned().map(Immutable::new)
    }

    /// Element of an array.
    pub fn at(&self, index: usize) -> Option<Immutable> {
        self.0.get(index).cloned().map(Immutable::new)
    }

    /// First element of an array.
    pub fn first(&self) -> Option<Immutable> {
        self.at(0)
    }

    /// Number of entries of an array or object; zero for scalars.
    pub fn len(&self) -> usize {
        match &*self.0 {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 0,
        }
    }

    /// True for empty arrays and objects, and for scalars.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements of an array, each as its own handle.
    pub fn items(&self) -> Vec<Immutable> {
        match &*self.0 {
            Value::Array(items) => items.iter().cloned().map(Immutable::new).collect(),
            _ => Vec::new(),
        }
    }

    /// Copy-on-write update: clone the value, let `f` edit the copy, wrap it.
    pub fn update<F>(&self, f: F) -> Immutable
    where
        F: FnOnce(&mut Value),
    {
        let mut copy = self.to_plain();
        f(&mut copy);
        Immutable::new(copy)
    }

    /// Set an object field. A non-object receiver becomes a one-field object.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Immutable {
        let key = key.into();
        let value = value.into();
        self.update(move |v| match v {
            Value::Object(map) => {
                map.insert(key, value);
            }
            other => {
                let mut map = Map::new();
                map.insert(key, value);
                *other = Value::Object(map);
            }
        })
    }

    /// Remove an object field.
    pub fn remove(&self, key: &str) -> Immutable {
        self.update(|v| {
            if let Value::Object(map) = v {
                map.remove(key);
            }
        })
    }

    /// Shallow merge of `other`'s fields over this object. Anything that is
    /// not an object on either side is replaced by `other` wholesale.
    pub fn merge(&self, other: &Value) -> Immutable {
        match (&*self.0, other) {
            (Value::Object(_), Value::Object(incoming)) => self.update(|v| {
                if let Value::Object(map) = v {
                    for (k, val) in incoming {
                        map.insert(k.clone(), val.clone());
                    }
                }
            }),
            _ => Immutable::new(other.clone()),
        }
    }

    /// Insert into an array at `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Immutable {
        let value = value.into();
        self.update(move |v| match v {
            Value::Array(items) => {
                let index = index.min(items.len());
                items.insert(index, value);
            }
            other => *other = Value::Array(vec![value]),
        })
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> Immutable {
        let value = value.into();
        self.update(move |v| match v {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        })
    }
}

impl Default for Immutable {
    fn default() -> Self {
        Immutable::empty_map()
    }
}

/// Structural equality with a pointer fast path.
impl PartialEq for Immutable {
    fn eq(&self, other: &Self) -> bool {
        Immutable::ptr_eq(self, other) || *self.0 == *other.0
    }
}

impl Eq for Immutable {}

impl PartialEq<Value> for Immutable {
    fn eq(&self, other: &Value) -> bool {
        *self.0 == *other
    }
}

impl From<Value> for Immutable {
    fn from(value: Value) -> Self {
        Immutable::new(value)
    }
}

impl From<Immutable> for Value {
    fn from(value: Immutable) -> Self {
        Arc::try_unwrap(value.0).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl fmt::Debug for Immutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Immutable({})", self.0)
    }
}

impl fmt::Display for Immutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Immutable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Immutable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Immutable::new)
    }
}
