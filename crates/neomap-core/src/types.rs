//! Graph primitives shared by the store and the mapper.
//!
//! Nodes and edges are addressed by the database-assigned ids. Property
//! values are a closed set of scalars; dates travel as RFC 3339 strings
//! inside the store and are re-typed by the mapper for date fields.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;

// ── Ids ───────────────────────────────────────────────────────────

/// Database id of a node. Assigned on first write, immutable afterwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Database id of an edge. Edge ids grow with creation order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EdgeId(pub i64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a node an edge is read from or written to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `(self)-[label]->(target)`
    #[default]
    Outgoing,
    /// `(target)-[label]->(self)`
    Incoming,
}

// ── Property Values ───────────────────────────────────────────────

/// A single property value on a node or edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Only produced by entities; the store sees the RFC 3339 string.
    #[serde(skip_deserializing)]
    Date(DateTime<Utc>),
}

/// Ordered property bag of a node or edge.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Date(_) => "date",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Dates are accepted either typed or as their RFC 3339 storage form.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            Self::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// The form written to the store: dates become RFC 3339 strings.
    pub fn to_storage(&self) -> PropertyValue {
        match self {
            Self::Date(d) => Self::String(d.to_rfc3339()),
            other => other.clone(),
        }
    }

    /// Convert into a typed Rust value for `entity.field`.
    pub fn extract<T: FromProperty>(&self, entity: &str, field: &str) -> Result<T, MappingError> {
        T::from_property(self)
            .ok_or_else(|| MappingError::invalid_value(entity, field, T::EXPECTED, self.type_name()))
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for PropertyValue {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<NodeId> for PropertyValue {
    fn from(id: NodeId) -> Self {
        Self::Int(id.0)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Typed extraction from a [`PropertyValue`].
pub trait FromProperty: Sized {
    /// Human-readable name of the expected type.
    const EXPECTED: &'static str;

    fn from_property(value: &PropertyValue) -> Option<Self>;
}

impl FromProperty for String {
    const EXPECTED: &'static str = "string";

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromProperty for i64 {
    const EXPECTED: &'static str = "int";

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromProperty for f64 {
    const EXPECTED: &'static str = "float";

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromProperty for bool {
    const EXPECTED: &'static str = "bool";

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromProperty for DateTime<Utc> {
    const EXPECTED: &'static str = "date";

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_date()
    }
}

impl FromProperty for NodeId {
    const EXPECTED: &'static str = "int";

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_i64().map(NodeId)
    }
}

impl<T: FromProperty> FromProperty for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_property(value: &PropertyValue) -> Option<Self> {
        if value.is_null() {
            return Some(None);
        }
        T::from_property(value).map(Some)
    }
}

// ── Records ───────────────────────────────────────────────────────

/// A node as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub label: String,
    pub properties: PropertyMap,
}

/// An edge as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub label: String,
    pub properties: PropertyMap,
}

impl EdgeRecord {
    /// The endpoint that is not `node`, seen from the given direction.
    pub fn other_end(&self, direction: Direction) -> NodeId {
        match direction {
            Direction::Outgoing => self.to,
            Direction::Incoming => self.from,
        }
    }
}
