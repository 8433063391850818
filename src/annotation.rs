//! Annotation syntax tree.
//!
//! Every raw annotation block parses into a list of [`AnnotationNode`] trees.
//! Attribute values form a closed sum type ([`AttrValue`]) so later phases can
//! check the allowed value shapes for each tag exhaustively.

use crate::error::Position;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tags understood by the document builder.
pub const KNOWN_TAGS: &[&str] = &[
    "Info",
    "Contact",
    "License",
    "Server",
    "Tag",
    "SecurityScheme",
    "Get",
    "Post",
    "Put",
    "Patch",
    "Delete",
    "Head",
    "Options",
    "Trace",
    "Schema",
    "Property",
    "Items",
    "Parameter",
    "RequestBody",
    "Response",
    "JsonContent",
    "MediaType",
];

/// Tags that only make sense nested inside another tag.
pub const NESTED_ONLY_TAGS: &[&str] = &["Items", "JsonContent", "MediaType"];

pub fn is_known_tag(name: &str) -> bool {
    KNOWN_TAGS.contains(&name)
}

/// One parsed `@Tag(...)` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationNode {
    /// Tag name with any namespace prefix removed (`OA\Get` -> `Get`)
    pub name: String,
    /// Keyed attributes in declaration order
    pub attributes: IndexMap<String, AttrValue>,
    /// Positional nested tags in declaration order
    pub children: Vec<AnnotationNode>,
    /// Position of the `@` in the source unit
    pub position: Position,
}

impl AnnotationNode {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            position,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Nested tags with the given name, whether positional or attribute-valued.
    pub fn nested<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a AnnotationNode> + 'a {
        let positional = self.children.iter().filter(move |c| c.name == name);
        let keyed = self.attributes.values().filter_map(move |v| match v {
            AttrValue::Tag(node) if node.name == name => Some(node.as_ref()),
            _ => None,
        });
        positional.chain(keyed)
    }
}

/// Attribute value inside an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// A bare identifier that the constant table did not define
    Constant(String),
    Array(Vec<AttrValue>),
    /// `{"key": value, ...}` with keys in declaration order
    Map(Vec<(String, AttrValue)>),
    Tag(Box<AnnotationNode>),
}

impl AttrValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Str(_) => "string",
            AttrValue::Int(_) => "integer",
            AttrValue::Float(_) => "number",
            AttrValue::Bool(_) => "boolean",
            AttrValue::Null => "null",
            AttrValue::Constant(_) => "constant",
            AttrValue::Array(_) => "array",
            AttrValue::Map(_) => "map",
            AttrValue::Tag(_) => "annotation",
        }
    }

    /// Converts a constant table entry into an attribute value.
    pub fn from_json(value: &serde_json::Value) -> AttrValue {
        match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Int(i),
                None => AttrValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => AttrValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                AttrValue::Array(items.iter().map(AttrValue::from_json).collect())
            }
            serde_json::Value::Object(map) => AttrValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}
