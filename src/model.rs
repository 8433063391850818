//! The in-memory Document Model.
//!
//! The builder folds annotation trees into a [`DocumentModel`]; the resolver
//! marks every [`Reference`]; the validator checks it; the serializer lowers it
//! into the output document. Every node remembers where it was declared so
//! later phases can point diagnostics at the source.

use crate::error::SourceLocation;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentModel {
    pub info: Info,
    pub servers: Vec<Server>,
    pub tags: IndexMap<String, Tag>,
    /// URL template -> method -> operation
    pub paths: BTreeMap<String, BTreeMap<HttpMethod, Operation>>,
    pub components: Components,
    /// Constant placeholders that the constant table did not define
    pub unresolved_constants: Vec<UnresolvedConstant>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub terms_of_service: Option<String>,
    pub contact: Option<Contact>,
    pub license: Option<License>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct License {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub url: String,
    pub description: Option<String>,
    pub source: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub description: Option<String>,
    pub source: SourceLocation,
}

/// HTTP methods, declared in canonical output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    /// Maps an operation tag name (`Get`, `Post`, ...) to its method.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Get" => Some(HttpMethod::Get),
            "Put" => Some(HttpMethod::Put),
            "Post" => Some(HttpMethod::Post),
            "Delete" => Some(HttpMethod::Delete),
            "Options" => Some(HttpMethod::Options),
            "Head" => Some(HttpMethod::Head),
            "Patch" => Some(HttpMethod::Patch),
            "Trace" => Some(HttpMethod::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Put => "put",
            HttpMethod::Post => "post",
            HttpMethod::Delete => "delete",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Patch => "patch",
            HttpMethod::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope name -> required scopes
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operation_id: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub parameters: Vec<RefOr<ParameterNode>>,
    pub request_body: Option<RefOr<RequestBodyNode>>,
    /// Status code (or `default`) -> response, in declaration order
    pub responses: IndexMap<String, RefOr<ResponseNode>>,
    pub security: Option<Vec<SecurityRequirement>>,
    pub source: SourceLocation,
}

/// Where a parameter is carried in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// Anything else; rejected by validation
    Unrecognized(String),
}

impl ParameterLocation {
    pub fn parse(value: &str) -> Self {
        match value {
            "path" => ParameterLocation::Path,
            "query" => ParameterLocation::Query,
            "header" => ParameterLocation::Header,
            "cookie" => ParameterLocation::Cookie,
            other => ParameterLocation::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
            ParameterLocation::Unrecognized(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub description: Option<String>,
    pub deprecated: bool,
    pub schema: Option<RefOr<SchemaNode>>,
    pub example: Option<Value>,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyNode {
    pub description: Option<String>,
    pub required: bool,
    /// Media type -> content
    pub content: IndexMap<String, MediaTypeNode>,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseNode {
    pub description: String,
    pub content: IndexMap<String, MediaTypeNode>,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaTypeNode {
    pub schema: Option<RefOr<SchemaNode>>,
    pub example: Option<Value>,
}

/// JSON Schema type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
}

impl SchemaType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "object" => Some(SchemaType::Object),
            "array" => Some(SchemaType::Array),
            "string" => Some(SchemaType::String),
            "integer" => Some(SchemaType::Integer),
            "number" => Some(SchemaType::Number),
            "boolean" => Some(SchemaType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub title: Option<String>,
    pub description: Option<String>,
    pub schema_type: Option<SchemaType>,
    pub format: Option<String>,
    pub nullable: bool,
    pub properties: IndexMap<String, RefOr<SchemaNode>>,
    pub required: Vec<String>,
    pub items: Option<Box<RefOr<SchemaNode>>>,
    pub enum_values: Vec<Value>,
    pub example: Option<Value>,
    pub source: SourceLocation,
}

impl SchemaNode {
    pub fn new(source: SourceLocation) -> Self {
        Self {
            title: None,
            description: None,
            schema_type: None,
            format: None,
            nullable: false,
            properties: IndexMap::new(),
            required: Vec::new(),
            items: None,
            enum_values: Vec::new(),
            example: None,
            source,
        }
    }

    pub fn typed(schema_type: SchemaType, source: SourceLocation) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::new(source)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecuritySchemeNode {
    pub scheme_type: String,
    pub description: Option<String>,
    /// Header, query or cookie name of an `apiKey` scheme
    pub name: Option<String>,
    pub location: Option<String>,
    pub scheme: Option<String>,
    pub bearer_format: Option<String>,
    pub source: SourceLocation,
}

/// The named registries referenced from operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Components {
    pub schemas: IndexMap<String, RefOr<SchemaNode>>,
    pub parameters: IndexMap<String, RefOr<ParameterNode>>,
    pub request_bodies: IndexMap<String, RefOr<RequestBodyNode>>,
    pub responses: IndexMap<String, RefOr<ResponseNode>>,
    pub security_schemes: IndexMap<String, SecuritySchemeNode>,
}

impl Components {
    pub fn contains(&self, collection: Collection, name: &str) -> bool {
        match collection {
            Collection::Schemas => self.schemas.contains_key(name),
            Collection::Parameters => self.parameters.contains_key(name),
            Collection::RequestBodies => self.request_bodies.contains_key(name),
            Collection::Responses => self.responses.contains_key(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.parameters.is_empty()
            && self.request_bodies.is_empty()
            && self.responses.is_empty()
            && self.security_schemes.is_empty()
    }
}

/// Component registries a [`Reference`] can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Schemas,
    Parameters,
    RequestBodies,
    Responses,
}

impl Collection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "schemas" => Some(Collection::Schemas),
            "parameters" => Some(Collection::Parameters),
            "requestBodies" => Some(Collection::RequestBodies),
            "responses" => Some(Collection::Responses),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Schemas => "schemas",
            Collection::Parameters => "parameters",
            Collection::RequestBodies => "requestBodies",
            Collection::Responses => "responses",
        }
    }
}

/// Resolution state of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Not yet looked at by the resolver
    Pending,
    Resolved,
    /// Points back into its own schema cycle; never expanded inline
    Recursive,
    /// Target missing or of the wrong kind
    Dangling,
}

/// A symbolic pointer `<collection>/<name>` into the Components registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub collection: Collection,
    pub name: String,
    /// Collection the referencing position requires
    pub expected: Collection,
    pub state: RefState,
    pub source: SourceLocation,
}

impl Reference {
    /// Parses `#/components/<collection>/<name>`, `<collection>/<name>` or a
    /// bare name, which takes the `expected` collection.
    ///
    /// Returns `None` when the collection segment is not a known registry.
    pub fn parse(raw: &str, expected: Collection, source: SourceLocation) -> Option<Self> {
        let trimmed = raw.trim_start_matches("#/components/");
        let (collection, name) = match trimmed.split_once('/') {
            Some((collection, name)) => (Collection::parse(collection)?, name),
            None => (expected, trimmed),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            collection,
            name: name.to_string(),
            expected,
            state: RefState::Pending,
            source,
        })
    }

    pub fn pointer(&self) -> String {
        format!("#/components/{}/{}", self.collection.as_str(), self.name)
    }
}

/// Either an inline node or a reference to a named component.
#[derive(Debug, Clone, PartialEq)]
pub enum RefOr<T> {
    Item(T),
    Ref(Reference),
}

impl<T> RefOr<T> {
    pub fn as_item(&self) -> Option<&T> {
        match self {
            RefOr::Item(item) => Some(item),
            RefOr::Ref(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            RefOr::Ref(reference) => Some(reference),
            RefOr::Item(_) => None,
        }
    }
}

/// Model nodes that remember their declaration site.
pub trait Located {
    fn source(&self) -> &SourceLocation;
}

macro_rules! impl_located {
    ($($node:ty),*) => {
        $(impl Located for $node {
            fn source(&self) -> &SourceLocation {
                &self.source
            }
        })*
    };
}

impl_located!(
    SchemaNode,
    ParameterNode,
    RequestBodyNode,
    ResponseNode,
    SecuritySchemeNode,
    Operation,
    Tag
);

impl<T: Located> Located for RefOr<T> {
    fn source(&self) -> &SourceLocation {
        match self {
            RefOr::Item(item) => item.source(),
            RefOr::Ref(reference) => &reference.source,
        }
    }
}

/// A constant placeholder left in the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedConstant {
    pub name: String,
    /// Dotted path of the entity that uses it
    pub entity: String,
    pub source: SourceLocation,
}

/// Placeholders of a URL template (`/projects/{id}` -> `["id"]`).
pub fn path_placeholders(path: &str) -> Vec<&str> {
    let mut placeholders = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                placeholders.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    placeholders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn loc() -> SourceLocation {
        SourceLocation::new("a.php", Position::new(1, 1))
    }

    #[test]
    fn test_reference_parse_forms() {
        let full = Reference::parse("#/components/schemas/Project", Collection::Responses, loc()).unwrap();
        assert_eq!(full.collection, Collection::Schemas);
        assert_eq!(full.expected, Collection::Responses);
        assert_eq!(full.name, "Project");
        assert_eq!(full.pointer(), "#/components/schemas/Project");

        let short = Reference::parse("responses/NotFound", Collection::Responses, loc()).unwrap();
        assert_eq!(short.collection, Collection::Responses);
        assert_eq!(short.name, "NotFound");

        let bare = Reference::parse("Project", Collection::Schemas, loc()).unwrap();
        assert_eq!(bare.collection, Collection::Schemas);
        assert_eq!(bare.state, RefState::Pending);

        assert!(Reference::parse("#/components/widgets/X", Collection::Schemas, loc()).is_none());
        assert!(Reference::parse("schemas/", Collection::Schemas, loc()).is_none());
    }

    #[test]
    fn test_methods_sort_in_canonical_order() {
        let mut methods = vec![HttpMethod::Patch, HttpMethod::Post, HttpMethod::Get, HttpMethod::Delete];
        methods.sort();
        assert_eq!(
            methods,
            vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete, HttpMethod::Patch]
        );
    }

    #[test]
    fn test_path_placeholders() {
        assert_eq!(path_placeholders("/projects/{project}/tasks/{task}"), vec!["project", "task"]);
        assert!(path_placeholders("/projects").is_empty());
        assert!(path_placeholders("/broken/{id").is_empty());
    }

    #[test]
    fn test_parameter_location_parse() {
        assert_eq!(ParameterLocation::parse("path"), ParameterLocation::Path);
        assert_eq!(
            ParameterLocation::parse("body"),
            ParameterLocation::Unrecognized("body".to_string())
        );
        assert_eq!(ParameterLocation::parse("body").as_str(), "body");
    }
}
