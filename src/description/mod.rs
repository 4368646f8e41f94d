//! Platform description tree.
//!
//! A [`Value`] is the type-erased configuration node produced by the input
//! adapters in [`loader`] (YAML, JSON and the command line). Nodes are
//! reference counted and immutable once built: [`Value::merge`] and
//! [`Value::without`] build new maps that share untouched children with
//! their inputs.
//!
//! Typed access goes through [`Value::parse`], which runs the
//! [`FromValue`] converter of the requested type and marks the scalar as
//! consumed. [`Value::visit_non_converted`] later reports the scalars that
//! nobody consumed.

pub mod address;
pub mod convert;
pub mod loader;
mod positions;
pub mod registry;
pub mod time;

pub use address::AddressRange;
pub use convert::{ConversionError, FromValue};
pub use loader::LoadError;
pub use registry::{ConverterRegistry, FromParam, ParamValue};
pub use time::SimTime;

use std::cell::Cell;
use std::collections::{btree_map, BTreeMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Where a node of the description was declared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Origin {
    /// Declared in a file. Nodes the loader could not place carry the path
    /// only.
    File {
        path: Arc<str>,
        line: Option<usize>,
        column: Option<usize>,
    },
    /// Declared on the command line.
    Cmdline,
    #[default]
    Unknown,
}

impl Origin {
    pub fn file(path: &str) -> Self {
        Origin::File {
            path: Arc::from(path),
            line: None,
            column: None,
        }
    }

    pub fn file_at(path: &str, line: usize, column: usize) -> Self {
        Origin::File {
            path: Arc::from(path),
            line: Some(line),
            column: Some(column),
        }
    }

    /// The same file at another position. Other origins have no position.
    pub fn at(&self, line: usize, column: usize) -> Self {
        match self {
            Origin::File { path, .. } => Origin::File {
                path: Arc::clone(path),
                line: Some(line),
                column: Some(column),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File {
                path,
                line: Some(line),
                column: Some(column),
            } => write!(f, "{}:{}:{}", path, line, column),
            Origin::File {
                path,
                line: Some(line),
                column: None,
            } => write!(f, "{}:{}", path, line),
            Origin::File { path, .. } => write!(f, "{}", path),
            Origin::Cmdline => write!(f, "<cmdline>"),
            Origin::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// Type of a scalar as reported by the adapter that produced it.
///
/// Only used to re-serialise the tree faithfully; conversions always work
/// on the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarHint {
    Int,
    Float,
    Bool,
    Str,
    Null,
}

/// Kind of a [`Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Map,
    Vector,
    Scalar,
    Nil,
    Invalid,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Map => "map",
            NodeKind::Vector => "vector",
            NodeKind::Scalar => "scalar",
            NodeKind::Nil => "nil",
            NodeKind::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ScalarNode {
    raw: String,
    hint: ScalarHint,
    origin: Origin,
    converted: Cell<bool>,
}

impl ScalarNode {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn hint(&self) -> ScalarHint {
        self.hint
    }
}

#[derive(Debug)]
pub struct MapNode {
    entries: BTreeMap<String, Value>,
    origin: Origin,
}

#[derive(Debug)]
pub struct VectorNode {
    items: Vec<Value>,
    origin: Origin,
}

/// A node of the description tree.
///
/// Cloning a `Value` clones a handle: both handles share the same subtree.
/// Use [`Value::deep_clone`] for an independent copy.
#[derive(Debug, Clone)]
pub enum Value {
    Map(Rc<MapNode>),
    Vector(Rc<VectorNode>),
    Scalar(Rc<ScalarNode>),
    /// Explicit absence, e.g. a missing key or a YAML `~`.
    Nil(Origin),
    /// Result of an access that makes no sense, such as a key lookup on a
    /// scalar. Never acted upon.
    Invalid,
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil(Origin::Unknown)
    }
}

/// Key of an entry produced by [`Value::entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> Key<'a> {
    /// The key as a map key, `None` for vector indices.
    pub fn name(&self) -> Option<&'a str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Iterator over the children of a map or a vector.
pub enum Entries<'a> {
    Map(btree_map::Iter<'a, String, Value>),
    Vector(std::iter::Enumerate<std::slice::Iter<'a, Value>>),
}

impl<'a> Iterator for Entries<'a> {
    type Item = (Key<'a>, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Entries::Map(it) => it.next().map(|(k, v)| (Key::Name(k.as_str()), v)),
            Entries::Vector(it) => it.next().map(|(i, v)| (Key::Index(i), v)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Entries::Map(it) => it.size_hint(),
            Entries::Vector(it) => it.size_hint(),
        }
    }
}

impl Value {
    pub fn scalar(raw: impl Into<String>, hint: ScalarHint, origin: Origin) -> Self {
        Value::Scalar(Rc::new(ScalarNode {
            raw: raw.into(),
            hint,
            origin,
            converted: Cell::new(false),
        }))
    }

    /// A string scalar of unknown origin.
    pub fn string(raw: impl Into<String>) -> Self {
        Value::scalar(raw, ScalarHint::Str, Origin::Unknown)
    }

    /// Build a map. When a key repeats, the last entry wins.
    pub fn map<K, I>(origin: Origin, entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(Rc::new(MapNode {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            origin,
        }))
    }

    pub fn vector<I>(origin: Origin, items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Vector(Rc::new(VectorNode {
            items: items.into_iter().collect(),
            origin,
        }))
    }

    pub fn nil() -> Self {
        Value::Nil(Origin::Unknown)
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Value::Map(_) => NodeKind::Map,
            Value::Vector(_) => NodeKind::Vector,
            Value::Scalar(_) => NodeKind::Scalar,
            Value::Nil(_) => NodeKind::Nil,
            Value::Invalid => NodeKind::Invalid,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Value::Vector(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn origin(&self) -> Origin {
        match self {
            Value::Map(node) => node.origin.clone(),
            Value::Vector(node) => node.origin.clone(),
            Value::Scalar(node) => node.origin.clone(),
            Value::Nil(origin) => origin.clone(),
            Value::Invalid => Origin::Unknown,
        }
    }

    /// Raw text of a scalar.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Value::Scalar(node) => Some(&node.raw),
            _ => None,
        }
    }

    /// Number of children of a map or vector, 1 for a scalar and 0 otherwise.
    pub fn size(&self) -> usize {
        match self {
            Value::Map(node) => node.entries.len(),
            Value::Vector(node) => node.items.len(),
            Value::Scalar(_) => 1,
            Value::Nil(_) | Value::Invalid => 0,
        }
    }

    /// Child `key` of a map.
    ///
    /// Returns `Nil` when the key is absent and `Invalid` when `self` is not
    /// a map.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Map(node) => node
                .entries
                .get(key)
                .cloned()
                .unwrap_or_else(|| Value::Nil(node.origin.clone())),
            _ => Value::Invalid,
        }
    }

    /// Element `index` of a vector, with the same conventions as [`Value::get`].
    pub fn get_index(&self, index: usize) -> Value {
        match self {
            Value::Vector(node) => node
                .items
                .get(index)
                .cloned()
                .unwrap_or_else(|| Value::Nil(node.origin.clone())),
            _ => Value::Invalid,
        }
    }

    /// Follow a dotted path of map keys, e.g. `"global.config-dir"`.
    pub fn get_path(&self, path: &str) -> Value {
        path.split('.')
            .fold(self.clone(), |node, key| node.get(key))
    }

    pub fn exists(&self, key: &str) -> bool {
        match self {
            Value::Map(node) => node.entries.contains_key(key),
            _ => false,
        }
    }

    /// Map keys in order. Empty for anything but a map.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let entries = match self {
            Value::Map(node) => Some(node.entries.keys()),
            _ => None,
        };
        entries.into_iter().flatten().map(String::as_str)
    }

    /// Iterate over the children of a map or a vector.
    ///
    /// Iterating anything else is an error rather than an empty sequence.
    pub fn entries(&self) -> Result<Entries<'_>, ConversionError> {
        match self {
            Value::Map(node) => Ok(Entries::Map(node.entries.iter())),
            Value::Vector(node) => Ok(Entries::Vector(node.items.iter().enumerate())),
            other => Err(ConversionError::NotIterable {
                kind: other.kind(),
                origin: other.origin(),
            }),
        }
    }

    /// Convert the node to `T`, marking the scalar as consumed on success.
    ///
    /// # Examples
    /// ```
    /// use vplatform::description::Value;
    ///
    /// assert_eq!(Value::string("4K").parse::<u32>(), Ok(4096));
    /// assert!(Value::string("-1").parse::<bool>().is_err());
    /// ```
    pub fn parse<T: FromValue>(&self) -> Result<T, ConversionError> {
        let converted = T::from_value(self)?;
        self.mark_converted();
        Ok(converted)
    }

    /// Mark a scalar as consumed without converting it.
    pub fn mark_converted(&self) {
        if let Value::Scalar(node) = self {
            node.converted.set(true);
        }
    }

    pub fn is_converted(&self) -> bool {
        match self {
            Value::Scalar(node) => node.converted.get(),
            _ => false,
        }
    }

    /// Merge two descriptions, `self` taking priority.
    ///
    /// Maps are merged recursively and keep the keys of both sides. Any
    /// other non-nil node wins outright over `other`, vectors included.
    pub fn merge(&self, other: &Value) -> Value {
        match self {
            Value::Nil(_) | Value::Invalid => other.clone(),
            Value::Map(mine) => match other {
                Value::Map(theirs) => {
                    let mut entries = BTreeMap::new();
                    for (key, value) in &mine.entries {
                        let merged = match theirs.entries.get(key) {
                            Some(their_value) => value.merge(their_value),
                            None => value.clone(),
                        };
                        entries.insert(key.clone(), merged);
                    }
                    for (key, value) in &theirs.entries {
                        entries
                            .entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                    Value::Map(Rc::new(MapNode {
                        entries,
                        origin: mine.origin.clone(),
                    }))
                }
                _ => self.clone(),
            },
            Value::Vector(mine) => {
                if other.is_vector() {
                    debug!(
                        "Vector at {} overrides vector at {}",
                        mine.origin,
                        other.origin()
                    );
                }
                self.clone()
            }
            Value::Scalar(_) => self.clone(),
        }
    }

    /// Copy the whole subtree. Origins and converted markers are kept.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Map(node) => Value::Map(Rc::new(MapNode {
                entries: node
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
                origin: node.origin.clone(),
            })),
            Value::Vector(node) => Value::Vector(Rc::new(VectorNode {
                items: node.items.iter().map(Value::deep_clone).collect(),
                origin: node.origin.clone(),
            })),
            Value::Scalar(node) => Value::Scalar(Rc::new(ScalarNode {
                raw: node.raw.clone(),
                hint: node.hint,
                origin: node.origin.clone(),
                converted: Cell::new(node.converted.get()),
            })),
            Value::Nil(origin) => Value::Nil(origin.clone()),
            Value::Invalid => Value::Invalid,
        }
    }

    /// A copy of this map without `key`. Other nodes are returned as is.
    pub fn without(&self, key: &str) -> Value {
        match self {
            Value::Map(node) if node.entries.contains_key(key) => {
                let mut entries = node.entries.clone();
                entries.remove(key);
                Value::Map(Rc::new(MapNode {
                    entries,
                    origin: node.origin.clone(),
                }))
            }
            _ => self.clone(),
        }
    }

    /// Call `visitor` on every scalar that was never converted, with its
    /// dotted key path.
    pub fn visit_non_converted<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Value),
    {
        let mut path = String::new();
        self.walk_non_converted(&mut path, &mut visitor);
    }

    fn walk_non_converted(&self, path: &mut String, visitor: &mut dyn FnMut(&str, &Value)) {
        let children = match self.entries() {
            Ok(entries) => entries,
            Err(_) => {
                if self.is_scalar() && !self.is_converted() {
                    visitor(path, self);
                }
                return;
            }
        };

        for (key, child) in children {
            let mark = path.len();
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&key.to_string());
            child.walk_non_converted(path, visitor);
            path.truncate(mark);
        }
    }
}

/// Structural equality. Origins and converted markers are ignored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => a.entries == b.entries,
            (Value::Vector(a), Value::Vector(b)) => a.items == b.items,
            (Value::Scalar(a), Value::Scalar(b)) => a.raw == b.raw,
            (Value::Nil(_), Value::Nil(_)) => true,
            (Value::Invalid, Value::Invalid) => true,
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Map(node) => {
                let mut map = serializer.serialize_map(Some(node.entries.len()))?;
                for (key, value) in &node.entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Vector(node) => {
                let mut seq = serializer.serialize_seq(Some(node.items.len()))?;
                for item in &node.items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Scalar(node) => serialize_scalar(node, serializer),
            Value::Nil(_) | Value::Invalid => serializer.serialize_unit(),
        }
    }
}

fn serialize_scalar<S: Serializer>(node: &ScalarNode, serializer: S) -> Result<S::Ok, S::Error> {
    let raw = node.raw.as_str();
    match node.hint {
        ScalarHint::Int => {
            if let Ok(n) = raw.parse::<i64>() {
                return serializer.serialize_i64(n);
            }
            if let Ok(n) = raw.parse::<u64>() {
                return serializer.serialize_u64(n);
            }
        }
        ScalarHint::Float => {
            if let Ok(n) = raw.parse::<f64>() {
                return serializer.serialize_f64(n);
            }
        }
        ScalarHint::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => return serializer.serialize_bool(true),
            "false" => return serializer.serialize_bool(false),
            _ => {}
        },
        ScalarHint::Null => return serializer.serialize_unit(),
        ScalarHint::Str => {}
    }
    serializer.serialize_str(raw)
}
