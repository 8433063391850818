//! Folds parsed annotation trees into a [`DocumentModel`].
//!
//! The fold dispatches on the top-level tag name. All state that outlives a
//! single tag lives in [`ModelBuilder`]; per-unit state (the unit path and the
//! diagnostic sinks) is carried by an explicit [`BuildContext`].

use crate::annotation::{AnnotationNode, AttrValue};
use crate::cache::ParsedBlock;
use crate::config::MetadataOverrides;
use crate::error::{Diagnostic, Phase, Position, SourceLocation};
use crate::extractor::{Symbol, SymbolKind};
use crate::model::{
    Collection, Contact, DocumentModel, HttpMethod, License, Located, MediaTypeNode,
    Operation, ParameterLocation, ParameterNode, RefOr, Reference, RequestBodyNode, ResponseNode,
    SchemaType, SecurityRequirement, SecuritySchemeNode, Server, Tag, UnresolvedConstant,
};
use crate::schema_generator;
use indexmap::IndexMap;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_TITLE: &str = "Generated API";
const DEFAULT_VERSION: &str = "1.0.0";

/// Per-unit context threaded through every tag handler.
pub(crate) struct BuildContext<'a> {
    pub path: &'a Path,
    pub diagnostics: &'a mut Vec<Diagnostic>,
    pub unresolved: &'a mut Vec<UnresolvedConstant>,
}

impl<'a> BuildContext<'a> {
    pub fn location(&self, position: Position) -> SourceLocation {
        SourceLocation::new(self.path, position)
    }

    pub fn error(&mut self, node: &AnnotationNode, entity: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic::error(Phase::Build, message)
            .for_entity(entity)
            .at(self.location(node.position));
        self.diagnostics.push(diagnostic);
    }

    pub fn warning(&mut self, node: &AnnotationNode, entity: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(Phase::Build, message)
            .for_entity(entity)
            .at(self.location(node.position));
        self.diagnostics.push(diagnostic);
    }

    /// Warns about keyed attributes the tag does not understand.
    ///
    /// Tag-valued attributes are skipped; they are looked up with
    /// [`AnnotationNode::nested`] and checked by [`Self::check_children`].
    pub fn check_attributes(&mut self, node: &AnnotationNode, allowed: &[&str], entity: &str) {
        for (key, value) in &node.attributes {
            if !allowed.contains(&key.as_str()) && !matches!(value, AttrValue::Tag(_)) {
                self.warning(
                    node,
                    entity,
                    format!("unknown attribute '{}' on @{} ignored", key, node.name),
                );
            }
        }
    }

    /// Warns about nested tags the tag does not understand.
    pub fn check_children(&mut self, node: &AnnotationNode, allowed: &[&str], entity: &str) {
        let nested = node.children.iter().chain(node.attributes.values().filter_map(|v| match v {
            AttrValue::Tag(tag) => Some(tag.as_ref()),
            _ => None,
        }));
        for child in nested {
            if !allowed.contains(&child.name.as_str()) {
                self.warning(
                    child,
                    entity,
                    format!("unexpected @{} inside @{} ignored", child.name, node.name),
                );
            }
        }
    }

    fn record_constant(&mut self, node: &AnnotationNode, name: &str, entity: &str) {
        debug!("Unresolved constant {} in {}", name, entity);
        self.unresolved.push(UnresolvedConstant {
            name: name.to_string(),
            entity: entity.to_string(),
            source: self.location(node.position),
        });
    }

    /// A string attribute. Numbers are accepted and rendered as strings.
    pub fn string(&mut self, node: &AnnotationNode, key: &str, entity: &str) -> Option<String> {
        match node.attr(key)? {
            AttrValue::Str(s) => Some(s.clone()),
            AttrValue::Int(i) => Some(i.to_string()),
            AttrValue::Float(f) => Some(f.to_string()),
            AttrValue::Constant(name) => {
                self.record_constant(node, name, entity);
                None
            }
            other => {
                self.shape_error(node, key, "a string", other, entity);
                None
            }
        }
    }

    /// A required string attribute; reports a missing value.
    pub fn required_string(&mut self, node: &AnnotationNode, key: &str, entity: &str) -> Option<String> {
        if node.attr(key).is_none() {
            self.error(node, entity, format!("@{} requires '{}'", node.name, key));
            return None;
        }
        self.string(node, key, entity)
    }

    pub fn bool(&mut self, node: &AnnotationNode, key: &str, entity: &str) -> Option<bool> {
        match node.attr(key)? {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Constant(name) => {
                self.record_constant(node, name, entity);
                None
            }
            other => {
                self.shape_error(node, key, "a boolean", other, entity);
                None
            }
        }
    }

    /// A list of strings; a single string is a one-element list.
    pub fn strings(&mut self, node: &AnnotationNode, key: &str, entity: &str) -> Vec<String> {
        let Some(value) = node.attr(key) else {
            return Vec::new();
        };
        let items: &[AttrValue] = match value {
            AttrValue::Array(items) => items,
            single => std::slice::from_ref(single),
        };
        let mut strings = Vec::new();
        for item in items {
            match item {
                AttrValue::Str(s) => strings.push(s.clone()),
                AttrValue::Constant(name) => self.record_constant(node, name, entity),
                other => self.shape_error(node, key, "a list of strings", other, entity),
            }
        }
        strings
    }

    /// Any non-tag attribute value, as JSON.
    pub fn json(&mut self, node: &AnnotationNode, key: &str, entity: &str) -> Option<Value> {
        let value = node.attr(key)?;
        Some(self.to_json(node, key, value, entity))
    }

    fn to_json(&mut self, node: &AnnotationNode, key: &str, value: &AttrValue, entity: &str) -> Value {
        match value {
            AttrValue::Str(s) => Value::String(s.clone()),
            AttrValue::Int(i) => Value::from(*i),
            AttrValue::Float(f) => Value::from(*f),
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Null => Value::Null,
            AttrValue::Constant(name) => {
                self.record_constant(node, name, entity);
                Value::Null
            }
            AttrValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.to_json(node, key, item, entity))
                    .collect(),
            ),
            AttrValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.to_json(node, key, v, entity)))
                    .collect(),
            ),
            AttrValue::Tag(_) => {
                self.shape_error(node, key, "a value", value, entity);
                Value::Null
            }
        }
    }

    /// A `ref` style attribute pointing into `expected`.
    pub fn reference(
        &mut self,
        node: &AnnotationNode,
        key: &str,
        expected: Collection,
        entity: &str,
    ) -> Option<Reference> {
        let raw = self.string(node, key, entity)?;
        let reference = Reference::parse(&raw, expected, self.location(node.position));
        if reference.is_none() {
            self.error(node, entity, format!("invalid reference '{}'", raw));
        }
        reference
    }

    fn shape_error(&mut self, node: &AnnotationNode, key: &str, expected: &str, found: &AttrValue, entity: &str) {
        self.error(
            node,
            entity,
            format!(
                "attribute '{}' of @{} must be {}, found {}",
                key,
                node.name,
                expected,
                found.kind()
            ),
        );
    }
}

/// A top-level `@Property` waiting for the schema of its owning type.
struct PendingProperty {
    owner: String,
    field: Symbol,
    node: AnnotationNode,
    path: PathBuf,
}

/// Aggregates every unit's parsed blocks into one model.
pub struct ModelBuilder<'m> {
    metadata: &'m MetadataOverrides,
    model: DocumentModel,
    diagnostics: Vec<Diagnostic>,
    info_declared: Option<SourceLocation>,
    info_title: Option<String>,
    info_version: Option<String>,
    contact_declared: Option<SourceLocation>,
    license_declared: Option<SourceLocation>,
    /// Qualified type name -> schema declared on that type
    type_schemas: HashMap<String, String>,
    pending_properties: Vec<PendingProperty>,
}

impl<'m> ModelBuilder<'m> {
    pub fn new(metadata: &'m MetadataOverrides) -> Self {
        Self {
            metadata,
            model: DocumentModel::default(),
            diagnostics: Vec::new(),
            info_declared: None,
            info_title: None,
            info_version: None,
            contact_declared: None,
            license_declared: None,
            type_schemas: HashMap::new(),
            pending_properties: Vec::new(),
        }
    }

    /// Folds the blocks of one unit. Units must be added in a stable order so
    /// duplicate conflicts are reported deterministically.
    pub fn add_unit(&mut self, path: &Path, blocks: &[ParsedBlock]) {
        debug!("Building from {} blocks of {}", blocks.len(), path.display());
        let mut diagnostics = std::mem::take(&mut self.diagnostics);
        let mut unresolved = std::mem::take(&mut self.model.unresolved_constants);
        let mut cx = BuildContext {
            path,
            diagnostics: &mut diagnostics,
            unresolved: &mut unresolved,
        };

        for block in blocks {
            for node in &block.nodes {
                self.add_node(&mut cx, &block.symbol, node);
            }
        }

        self.diagnostics = diagnostics;
        self.model.unresolved_constants = unresolved;
    }

    fn add_node(&mut self, cx: &mut BuildContext, symbol: &Symbol, node: &AnnotationNode) {
        if let Some(method) = HttpMethod::from_tag(&node.name) {
            return self.add_operation(cx, symbol, method, node);
        }
        match node.name.as_str() {
            "Info" | "Contact" | "License" | "Server" | "Tag" | "SecurityScheme" => {
                if matches!(symbol.kind, SymbolKind::Method | SymbolKind::Field) {
                    cx.error(
                        node,
                        &symbol.name,
                        format!("@{} is a global declaration and cannot be attached to {}", node.name, symbol.name),
                    );
                    return;
                }
                self.add_global(cx, node);
            }
            "Schema" => self.add_schema_component(cx, symbol, node),
            "Property" => self.add_field_property(cx, symbol, node),
            "Parameter" => {
                let Some(name) = cx.required_string(node, "parameter", "components.parameters") else {
                    return;
                };
                let entity = format!("components.parameters.{}", name);
                let parameter = parameter(cx, node, &entity, true);
                insert_component(cx, &mut self.model.components.parameters, name, parameter, node, &entity);
            }
            "RequestBody" => {
                let Some(name) = cx.required_string(node, "request", "components.requestBodies") else {
                    return;
                };
                let entity = format!("components.requestBodies.{}", name);
                let body = request_body(cx, node, &entity, true);
                insert_component(cx, &mut self.model.components.request_bodies, name, body, node, &entity);
            }
            "Response" => {
                let Some(name) = cx.required_string(node, "response", "components.responses") else {
                    return;
                };
                let entity = format!("components.responses.{}", name);
                let response = response(cx, node, &entity);
                insert_component(cx, &mut self.model.components.responses, name, response, node, &entity);
            }
            other => cx.warning(node, &symbol.name, format!("@{} is not handled at top level", other)),
        }
    }

    fn add_global(&mut self, cx: &mut BuildContext, node: &AnnotationNode) {
        match node.name.as_str() {
            "Info" => {
                if !self.claim_once(cx, node, "info") {
                    return;
                }
                cx.check_attributes(node, &["title", "version", "description", "termsOfService"], "info");
                cx.check_children(node, &["Contact", "License"], "info");
                self.info_title = cx.string(node, "title", "info");
                self.info_version = cx.string(node, "version", "info");
                self.model.info.description = cx.string(node, "description", "info");
                self.model.info.terms_of_service = cx.string(node, "termsOfService", "info");
                for child in node.nested("Contact").chain(node.nested("License")) {
                    self.add_global(cx, child);
                }
            }
            "Contact" => {
                if !self.claim_once(cx, node, "info.contact") {
                    return;
                }
                cx.check_attributes(node, &["name", "email", "url"], "info.contact");
                self.model.info.contact = Some(Contact {
                    name: cx.string(node, "name", "info.contact"),
                    email: cx.string(node, "email", "info.contact"),
                    url: cx.string(node, "url", "info.contact"),
                });
            }
            "License" => {
                if !self.claim_once(cx, node, "info.license") {
                    return;
                }
                cx.check_attributes(node, &["name", "url"], "info.license");
                let name = cx.required_string(node, "name", "info.license").unwrap_or_default();
                self.model.info.license = Some(License {
                    name,
                    url: cx.string(node, "url", "info.license"),
                });
            }
            "Server" => {
                cx.check_attributes(node, &["url", "description"], "servers");
                let Some(url) = cx.required_string(node, "url", "servers") else {
                    return;
                };
                let entity = format!("servers.{}", url);
                if let Some(first) = self.model.servers.iter().find(|s| s.url == url) {
                    let first = first.source.as_ref().map(|s| s.to_string()).unwrap_or_default();
                    cx.error(node, &entity, format!("duplicate global declaration: server '{}' first declared at {}", url, first));
                    return;
                }
                self.model.servers.push(Server {
                    url,
                    description: cx.string(node, "description", &entity),
                    source: Some(cx.location(node.position)),
                });
            }
            "Tag" => {
                cx.check_attributes(node, &["name", "description"], "tags");
                let Some(name) = cx.required_string(node, "name", "tags") else {
                    return;
                };
                let entity = format!("tags.{}", name);
                if let Some(first) = self.model.tags.get(&name) {
                    let first = first.source.to_string();
                    cx.error(node, &entity, format!("duplicate global declaration: tag '{}' first declared at {}", name, first));
                    return;
                }
                let tag = Tag {
                    name: name.clone(),
                    description: cx.string(node, "description", &entity),
                    source: cx.location(node.position),
                };
                self.model.tags.insert(name, tag);
            }
            "SecurityScheme" => self.add_security_scheme(cx, node),
            _ => {}
        }
    }

    /// Records the first declaration of a singleton global; reports later ones.
    fn claim_once(&mut self, cx: &mut BuildContext, node: &AnnotationNode, entity: &str) -> bool {
        let slot = match node.name.as_str() {
            "Info" => &mut self.info_declared,
            "Contact" => &mut self.contact_declared,
            _ => &mut self.license_declared,
        };
        match slot {
            Some(first) => {
                let message = format!("duplicate global declaration: @{} first declared at {}", node.name, first);
                cx.error(node, entity, message);
                false
            }
            None => {
                *slot = Some(cx.location(node.position));
                true
            }
        }
    }

    fn add_security_scheme(&mut self, cx: &mut BuildContext, node: &AnnotationNode) {
        let allowed = ["securityScheme", "type", "description", "name", "in", "scheme", "bearerFormat"];
        cx.check_attributes(node, &allowed, "components.securitySchemes");
        let Some(key) = cx.required_string(node, "securityScheme", "components.securitySchemes") else {
            return;
        };
        let entity = format!("components.securitySchemes.{}", key);
        if let Some(first) = self.model.components.security_schemes.get(&key) {
            let first = first.source.to_string();
            cx.error(node, &entity, format!("duplicate component '{}' first declared at {}", key, first));
            return;
        }
        let Some(scheme_type) = cx.required_string(node, "type", &entity) else {
            return;
        };
        let scheme = SecuritySchemeNode {
            scheme_type,
            description: cx.string(node, "description", &entity),
            name: cx.string(node, "name", &entity),
            location: cx.string(node, "in", &entity),
            scheme: cx.string(node, "scheme", &entity),
            bearer_format: cx.string(node, "bearerFormat", &entity),
            source: cx.location(node.position),
        };
        self.model.components.security_schemes.insert(key, scheme);
    }

    fn add_operation(&mut self, cx: &mut BuildContext, symbol: &Symbol, method: HttpMethod, node: &AnnotationNode) {
        if symbol.kind == SymbolKind::Field {
            cx.error(node, &symbol.name, format!("@{} cannot be attached to field {}", node.name, symbol.name));
            return;
        }
        let Some(path) = cx.required_string(node, "path", &symbol.name) else {
            return;
        };
        let entity = format!("paths.{}.{}", path, method);
        cx.check_attributes(
            node,
            &["path", "operationId", "tags", "summary", "description", "deprecated", "security"],
            &entity,
        );
        cx.check_children(node, &["Parameter", "RequestBody", "Response"], &entity);

        if let Some(first) = self.model.paths.get(&path).and_then(|ops| ops.get(&method)) {
            let first = first.source.to_string();
            cx.error(
                node,
                &entity,
                format!(
                    "duplicate operation {} {} first declared at {}",
                    method.as_str().to_uppercase(),
                    path,
                    first
                ),
            );
            return;
        }

        let operation_id = cx
            .string(node, "operationId", &entity)
            .unwrap_or_else(|| default_operation_id(symbol, method, &path));

        let parameters = node
            .nested("Parameter")
            .map(|child| parameter(cx, child, &format!("{}.parameters", entity), false))
            .collect();

        let mut bodies = node.nested("RequestBody");
        let request_body = bodies
            .next()
            .map(|child| request_body(cx, child, &format!("{}.requestBody", entity), false));
        for extra in bodies {
            cx.error(extra, &entity, "operation declares more than one @RequestBody");
        }

        let mut responses = IndexMap::new();
        for child in node.nested("Response") {
            let status = match cx.string(child, "response", &entity) {
                Some(status) => status,
                None if child.attr("response").is_some() => continue,
                None => "default".to_string(),
            };
            let response_entity = format!("{}.responses.{}", entity, status);
            if responses.contains_key(&status) {
                cx.error(child, &response_entity, format!("duplicate response status '{}'", status));
                continue;
            }
            let built = response(cx, child, &response_entity);
            responses.insert(status, built);
        }

        let operation = Operation {
            operation_id,
            tags: cx.strings(node, "tags", &entity),
            summary: cx.string(node, "summary", &entity),
            description: cx.string(node, "description", &entity),
            deprecated: cx.bool(node, "deprecated", &entity).unwrap_or(false),
            parameters,
            request_body,
            responses,
            security: security(cx, node, &entity),
            source: cx.location(node.position),
        };
        debug!("Operation {} {} from {}", method, path, symbol.name);
        self.model
            .paths
            .entry(path)
            .or_default()
            .insert(method, operation);
    }

    fn add_schema_component(&mut self, cx: &mut BuildContext, symbol: &Symbol, node: &AnnotationNode) {
        let name = match cx.string(node, "schema", "components.schemas") {
            Some(name) => name,
            None if node.attr("schema").is_some() => return,
            None if symbol.kind == SymbolKind::Type => symbol.short_name().to_string(),
            None => {
                cx.error(node, &symbol.name, "@Schema needs a 'schema' name outside a type declaration");
                return;
            }
        };
        let entity = format!("components.schemas.{}", name);
        let schema = schema_generator::schema_from_tag(cx, node, &entity);
        if insert_component(cx, &mut self.model.components.schemas, name.clone(), schema, node, &entity)
            && symbol.kind == SymbolKind::Type
        {
            self.type_schemas.insert(symbol.name.clone(), name);
        }
    }

    fn add_field_property(&mut self, cx: &mut BuildContext, symbol: &Symbol, node: &AnnotationNode) {
        match (symbol.kind, symbol.owner()) {
            (SymbolKind::Field, Some(owner)) => self.pending_properties.push(PendingProperty {
                owner: owner.to_string(),
                field: symbol.clone(),
                node: node.clone(),
                path: cx.path.to_path_buf(),
            }),
            _ => cx.error(node, &symbol.name, "top-level @Property must be attached to a field"),
        }
    }

    /// Attaches field properties to the schemas of their owning types.
    fn attach_properties(&mut self) {
        let pending = std::mem::take(&mut self.pending_properties);
        let mut diagnostics = std::mem::take(&mut self.diagnostics);
        let mut unresolved = std::mem::take(&mut self.model.unresolved_constants);

        for property in pending {
            let mut cx = BuildContext {
                path: &property.path,
                diagnostics: &mut diagnostics,
                unresolved: &mut unresolved,
            };
            let node = &property.node;
            let owner_short = property.owner.rsplit("::").next().unwrap_or(&property.owner);
            let schema_name = self
                .type_schemas
                .get(&property.owner)
                .cloned()
                .or_else(|| {
                    self.model
                        .components
                        .schemas
                        .contains_key(owner_short)
                        .then(|| owner_short.to_string())
                });
            let target = schema_name.and_then(|name| {
                match self.model.components.schemas.get_mut(&name) {
                    Some(RefOr::Item(schema)) => Some((name, schema)),
                    _ => None,
                }
            });
            let Some((schema_name, schema)) = target else {
                cx.error(
                    node,
                    &property.field.name,
                    format!("orphan property: type {} declares no schema", property.owner),
                );
                continue;
            };

            let property_name = match cx.string(node, "property", &property.field.name) {
                Some(name) => name,
                None => property.field.short_name().to_string(),
            };
            let entity = format!("components.schemas.{}.properties.{}", schema_name, property_name);
            if let Some(first) = schema.properties.get(&property_name) {
                let first = first.source().to_string();
                cx.error(node, &entity, format!("duplicate property '{}' first declared at {}", property_name, first));
                continue;
            }

            let built = schema_generator::field_property(&mut cx, node, property.field.declared_type.as_deref(), &entity);
            if cx.bool(node, "required", &entity) == Some(true) && !schema.required.contains(&property_name) {
                schema.required.push(property_name.clone());
            }
            schema.properties.insert(property_name, built);
            schema.schema_type.get_or_insert(SchemaType::Object);
        }

        self.diagnostics = diagnostics;
        self.model.unresolved_constants = unresolved;
    }

    /// Finishes the fold: attaches field properties and applies metadata.
    pub fn finish(mut self) -> (DocumentModel, Vec<Diagnostic>) {
        self.attach_properties();

        let overrides = self.metadata;
        let info = &mut self.model.info;
        info.title = overrides
            .title
            .clone()
            .or(self.info_title.take())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        info.version = overrides
            .version
            .clone()
            .or(self.info_version.take())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        if overrides.description.is_some() {
            info.description = overrides.description.clone();
        }
        if let Some(url) = &overrides.server_url {
            if !self.model.servers.iter().any(|s| &s.url == url) {
                self.model.servers.insert(
                    0,
                    Server {
                        url: url.clone(),
                        description: None,
                        source: None,
                    },
                );
            }
        }

        info!(
            "Built model: {} paths, {} schemas, {} diagnostics",
            self.model.paths.len(),
            self.model.components.schemas.len(),
            self.diagnostics.len()
        );
        (self.model, self.diagnostics)
    }
}

/// Builds a model from units given in traversal order.
pub fn build_model(units: &[(PathBuf, Vec<ParsedBlock>)], metadata: &MetadataOverrides) -> (DocumentModel, Vec<Diagnostic>) {
    let mut builder = ModelBuilder::new(metadata);
    for (path, blocks) in units {
        builder.add_unit(path, blocks);
    }
    builder.finish()
}

/// Inserts a named component; a second declaration is a build error naming both sites.
fn insert_component<T: Located>(
    cx: &mut BuildContext,
    registry: &mut IndexMap<String, RefOr<T>>,
    name: String,
    component: RefOr<T>,
    node: &AnnotationNode,
    entity: &str,
) -> bool {
    if let Some(first) = registry.get(&name) {
        let first = first.source().to_string();
        cx.error(node, entity, format!("duplicate component '{}' first declared at {}", name, first));
        return false;
    }
    registry.insert(name, component);
    true
}

fn default_operation_id(symbol: &Symbol, method: HttpMethod, path: &str) -> String {
    if symbol.kind == SymbolKind::Method {
        return symbol.name.replace("::", "_").replace('.', "_");
    }
    let slug: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        method.as_str().to_string()
    } else {
        format!("{}_{}", method, slug)
    }
}

fn security(cx: &mut BuildContext, node: &AnnotationNode, entity: &str) -> Option<Vec<SecurityRequirement>> {
    let value = node.attr("security")?;
    let AttrValue::Array(items) = value else {
        cx.error(node, entity, format!("attribute 'security' must be an array, found {}", value.kind()));
        return None;
    };
    let mut requirements = Vec::new();
    for item in items {
        let AttrValue::Map(entries) = item else {
            cx.error(node, entity, format!("security requirement must be a map, found {}", item.kind()));
            continue;
        };
        let mut requirement = SecurityRequirement::new();
        for (scheme, scopes) in entries {
            let scopes = match scopes {
                AttrValue::Array(scopes) => scopes
                    .iter()
                    .filter_map(|scope| match scope {
                        AttrValue::Str(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            requirement.insert(scheme.clone(), scopes);
        }
        requirements.push(requirement);
    }
    Some(requirements)
}

/// `@Parameter`, inline or as a component.
fn parameter(cx: &mut BuildContext, node: &AnnotationNode, entity: &str, component: bool) -> RefOr<ParameterNode> {
    let mut allowed = vec!["name", "in", "required", "description", "deprecated", "example", "ref"];
    if component {
        allowed.push("parameter");
    }
    cx.check_attributes(node, &allowed, entity);
    cx.check_children(node, &["Schema"], entity);

    if node.attr("ref").is_some() {
        if let Some(reference) = cx.reference(node, "ref", Collection::Parameters, entity) {
            return RefOr::Ref(reference);
        }
    }

    let name = cx.string(node, "name", entity).unwrap_or_default();
    let location = cx
        .string(node, "in", entity)
        .map(|l| ParameterLocation::parse(&l))
        .unwrap_or_else(|| ParameterLocation::Unrecognized(String::new()));
    let schema = node
        .nested("Schema")
        .next()
        .map(|child| schema_generator::schema_from_tag(cx, child, &format!("{}.{}.schema", entity, name)));

    RefOr::Item(ParameterNode {
        required: cx.bool(node, "required", entity).unwrap_or(false),
        description: cx.string(node, "description", entity),
        deprecated: cx.bool(node, "deprecated", entity).unwrap_or(false),
        example: cx.json(node, "example", entity),
        schema,
        name,
        location,
        source: cx.location(node.position),
    })
}

/// `@RequestBody`, inline or as a component.
fn request_body(cx: &mut BuildContext, node: &AnnotationNode, entity: &str, component: bool) -> RefOr<RequestBodyNode> {
    let mut allowed = vec!["description", "required", "ref"];
    if component {
        allowed.push("request");
    }
    cx.check_attributes(node, &allowed, entity);
    cx.check_children(node, &["JsonContent", "MediaType"], entity);

    if node.attr("ref").is_some() {
        if let Some(reference) = cx.reference(node, "ref", Collection::RequestBodies, entity) {
            return RefOr::Ref(reference);
        }
    }

    RefOr::Item(RequestBodyNode {
        description: cx.string(node, "description", entity),
        required: cx.bool(node, "required", entity).unwrap_or(false),
        content: content(cx, node, entity),
        source: cx.location(node.position),
    })
}

/// `@Response`, inline (keyed by status) or as a component.
fn response(cx: &mut BuildContext, node: &AnnotationNode, entity: &str) -> RefOr<ResponseNode> {
    cx.check_attributes(node, &["response", "description", "ref"], entity);
    cx.check_children(node, &["JsonContent", "MediaType"], entity);

    if node.attr("ref").is_some() {
        if let Some(reference) = cx.reference(node, "ref", Collection::Responses, entity) {
            return RefOr::Ref(reference);
        }
    }

    let description = match cx.string(node, "description", entity) {
        Some(description) => description,
        None => {
            if node.attr("description").is_none() {
                cx.warning(node, entity, "response has no description");
            }
            String::new()
        }
    };
    RefOr::Item(ResponseNode {
        description,
        content: content(cx, node, entity),
        source: cx.location(node.position),
    })
}

/// Media types declared by `@JsonContent` and `@MediaType` children.
fn content(cx: &mut BuildContext, node: &AnnotationNode, entity: &str) -> IndexMap<String, MediaTypeNode> {
    let mut content = IndexMap::new();
    for child in node.nested("JsonContent") {
        let media_entity = format!("{}.content.application/json", entity);
        let media = MediaTypeNode {
            example: cx.json(child, "example", &media_entity),
            schema: Some(schema_generator::schema_from_tag(cx, child, &media_entity)),
        };
        insert_media_type(cx, &mut content, child, "application/json".to_string(), media, entity);
    }
    for child in node.nested("MediaType") {
        cx.check_attributes(child, &["mediaType", "example"], entity);
        cx.check_children(child, &["Schema"], entity);
        let Some(media_type) = cx.required_string(child, "mediaType", entity) else {
            continue;
        };
        let media_entity = format!("{}.content.{}", entity, media_type);
        let media = MediaTypeNode {
            schema: child
                .nested("Schema")
                .next()
                .map(|schema| schema_generator::schema_from_tag(cx, schema, &media_entity)),
            example: cx.json(child, "example", &media_entity),
        };
        insert_media_type(cx, &mut content, child, media_type, media, entity);
    }
    content
}

fn insert_media_type(
    cx: &mut BuildContext,
    content: &mut IndexMap<String, MediaTypeNode>,
    node: &AnnotationNode,
    media_type: String,
    media: MediaTypeNode,
    entity: &str,
) {
    if content.contains_key(&media_type) {
        cx.error(node, entity, format!("media type '{}' declared twice", media_type));
        return;
    }
    content.insert(media_type, media);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RefState;
    use crate::parser::AnnotationParser;
    use crate::error::Severity;
    use std::collections::BTreeMap;

    fn block(symbol: Symbol, text: &str) -> ParsedBlock {
        let constants = BTreeMap::new();
        let outcome = AnnotationParser::new(&constants).parse(text, 1);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        ParsedBlock {
            symbol,
            start: Position::new(1, 1),
            nodes: outcome.nodes,
        }
    }

    fn build(units: Vec<(&str, Vec<ParsedBlock>)>) -> (DocumentModel, Vec<Diagnostic>) {
        let units: Vec<(PathBuf, Vec<ParsedBlock>)> = units
            .into_iter()
            .map(|(path, blocks)| (PathBuf::from(path), blocks))
            .collect();
        build_model(&units, &MetadataOverrides::default())
    }

    fn errors(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
        diagnostics.iter().filter(|d| d.severity == Severity::Error).collect()
    }

    fn method(name: &str) -> Symbol {
        Symbol::new(SymbolKind::Method, name)
    }

    #[test]
    fn test_operation_with_parameters_and_responses() {
        let text = r#"@Get(
    path="/projects/{project}",
    tags={"Projects"},
    summary="Show project",
    @Parameter(name="project", in="path", required=true, @Schema(type="integer")),
    @Response(response=200, description="OK", @JsonContent(ref="ProjectResource")),
    @Response(response=404, description="Missing")
)"#;
        let (model, diagnostics) = build(vec![(
            "ProjectController.php",
            vec![block(method("ProjectController::show"), text)],
        )]);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let op = &model.paths["/projects/{project}"][&HttpMethod::Get];
        assert_eq!(op.operation_id, "ProjectController_show");
        assert_eq!(op.tags, vec!["Projects".to_string()]);
        assert_eq!(op.summary.as_deref(), Some("Show project"));

        let param = op.parameters[0].as_item().unwrap();
        assert_eq!(param.location, ParameterLocation::Path);
        assert!(param.required);

        let statuses: Vec<_> = op.responses.keys().cloned().collect();
        assert_eq!(statuses, vec!["200", "404"]);
        let ok = op.responses["200"].as_item().unwrap();
        let schema = ok.content["application/json"].schema.as_ref().unwrap();
        let reference = schema.as_reference().unwrap();
        assert_eq!(reference.name, "ProjectResource");
        assert_eq!(reference.state, RefState::Pending);
    }

    #[test]
    fn test_duplicate_operation_names_both_locations() {
        let (model, diagnostics) = build(vec![
            ("a.php", vec![block(method("A::index"), "@Get(path=\"/x\", @Response(response=200, description=\"OK\"))")]),
            ("b.php", vec![block(method("B::index"), "\n@Get(path=\"/x\", @Response(response=200, description=\"OK\"))")]),
        ]);
        let errors = errors(&diagnostics);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate operation GET /x"));
        assert!(errors[0].message.contains("a.php:1:1"));
        assert_eq!(errors[0].location.as_ref().unwrap().to_string(), "b.php:2:1");
        assert_eq!(model.paths["/x"][&HttpMethod::Get].operation_id, "A_index");
    }

    #[test]
    fn test_duplicate_global_declaration() {
        let (model, diagnostics) = build(vec![(
            "a.php",
            vec![
                block(Symbol::file(), "@Info(title=\"A\", version=\"1\")"),
                block(Symbol::file(), "@Info(title=\"B\", version=\"2\")"),
            ],
        )]);
        let errors = errors(&diagnostics);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("duplicate global declaration"));
        assert_eq!(model.info.title, "A");
    }

    #[test]
    fn test_global_tag_on_method_is_rejected() {
        let (_, diagnostics) = build(vec![("a.php", vec![block(method("A::x"), "@Tag(name=\"t\")")])]);
        assert_eq!(errors(&diagnostics).len(), 1);
    }

    #[test]
    fn test_schema_and_field_properties() {
        let (model, diagnostics) = build(vec![
            (
                "Project.php",
                vec![
                    block(Symbol::field("Project.id", Some("int".into())), "@Property(required=true, example=1)"),
                    block(Symbol::field("Project.name", Some("?string".into())), "@Property()"),
                ],
            ),
            ("Schema.php", vec![block(Symbol::new(SymbolKind::Type, "Project"), "@Schema(title=\"Project\")")]),
        ]);
        assert!(errors(&diagnostics).is_empty(), "{:?}", diagnostics);

        let RefOr::Item(schema) = &model.components.schemas["Project"] else {
            panic!("expected inline schema");
        };
        assert_eq!(schema.required, vec!["id".to_string()]);
        let names: Vec<_> = schema.properties.keys().cloned().collect();
        assert_eq!(names, vec!["id", "name"]);

        let id = schema.properties["id"].as_item().unwrap();
        assert_eq!(id.schema_type, Some(SchemaType::Integer));
        assert_eq!(id.example, Some(serde_json::json!(1)));
        let name = schema.properties["name"].as_item().unwrap();
        assert_eq!(name.schema_type, Some(SchemaType::String));
        assert!(name.nullable);
    }

    #[test]
    fn test_orphan_property() {
        let (_, diagnostics) = build(vec![(
            "a.php",
            vec![block(Symbol::field("Loose.id", Some("int".into())), "@Property()")],
        )]);
        let errors = errors(&diagnostics);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("orphan property"));
    }

    #[test]
    fn test_duplicate_component() {
        let (_, diagnostics) = build(vec![(
            "a.php",
            vec![
                block(Symbol::file(), "@Response(response=\"NotFound\", description=\"Missing\")"),
                block(Symbol::file(), "@Response(response=\"NotFound\", description=\"Again\")"),
            ],
        )]);
        let errors = errors(&diagnostics);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("duplicate component 'NotFound'"));
    }

    #[test]
    fn test_unknown_attribute_and_shape_errors() {
        let (_, diagnostics) = build(vec![(
            "a.php",
            vec![block(
                method("A::x"),
                "@Get(path=\"/x\", colour=\"red\", deprecated=\"yes\", @Response(response=200, description=\"OK\"))",
            )],
        )]);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert!(diagnostics[0].message.contains("colour"));
        assert_eq!(diagnostics[1].severity, Severity::Error);
        assert!(diagnostics[1].message.contains("must be a boolean"));
    }

    #[test]
    fn test_unresolved_constants_are_recorded() {
        let (model, _) = build(vec![(
            "a.php",
            vec![block(method("A::x"), "@Get(path=\"/x\", summary=API_SUMMARY, @Response(response=200, description=\"OK\"))")],
        )]);
        assert_eq!(model.unresolved_constants.len(), 1);
        assert_eq!(model.unresolved_constants[0].name, "API_SUMMARY");
        assert_eq!(model.unresolved_constants[0].entity, "paths./x.get");
    }

    #[test]
    fn test_metadata_overrides_and_defaults() {
        let (model, _) = build(vec![]);
        assert_eq!(model.info.title, "Generated API");
        assert_eq!(model.info.version, "1.0.0");

        let overrides = MetadataOverrides {
            title: Some("Override".into()),
            server_url: Some("https://api.example.com".into()),
            ..Default::default()
        };
        let units = vec![(
            PathBuf::from("a.php"),
            vec![
                block(Symbol::file(), "@Info(title=\"Annotated\", version=\"2.0\")"),
                block(Symbol::file(), "@Server(url=\"http://localhost\")"),
            ],
        )];
        let (model, _) = build_model(&units, &overrides);
        assert_eq!(model.info.title, "Override");
        assert_eq!(model.info.version, "2.0");
        let urls: Vec<_> = model.servers.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://api.example.com", "http://localhost"]);
    }

    #[test]
    fn test_default_operation_id_outside_methods() {
        assert_eq!(
            default_operation_id(&Symbol::file(), HttpMethod::Get, "/projects/{project}/tasks"),
            "get_projects_project_tasks"
        );
        assert_eq!(default_operation_id(&Symbol::file(), HttpMethod::Post, "/"), "post");
    }
}
