//! Reference resolution over a built [`DocumentModel`].
//!
//! Every [`Reference`] is looked up in the Components registry and marked
//! `Resolved`, `Recursive` or `Dangling`. Schemas may reference themselves or
//! each other; a reference whose target can reach back to the referencing
//! component schema is marked `Recursive` so later phases never expand it
//! inline. Alias cycles among the other collections are errors.

use crate::error::{Diagnostic, Phase};
use crate::model::{
    Collection, Components, DocumentModel, MediaTypeNode, ParameterNode, RefOr, RefState, Reference,
    RequestBodyNode, ResponseNode, SchemaNode,
};
use indexmap::IndexMap;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Resolves every reference in place and returns the resolution diagnostics.
pub fn resolve(model: &mut DocumentModel) -> Vec<Diagnostic> {
    let mut resolver = Resolver::new(&model.components);
    resolver.check_alias_cycles(&model.components);

    for (name, schema) in model.components.schemas.iter_mut() {
        resolver.visit_schema(schema, Some(name.as_str()), &format!("components.schemas.{}", name));
    }
    for (name, parameter) in model.components.parameters.iter_mut() {
        resolver.visit_parameter(parameter, &format!("components.parameters.{}", name));
    }
    for (name, body) in model.components.request_bodies.iter_mut() {
        resolver.visit_request_body(body, &format!("components.requestBodies.{}", name));
    }
    for (name, response) in model.components.responses.iter_mut() {
        resolver.visit_response(response, &format!("components.responses.{}", name));
    }

    for (path, operations) in model.paths.iter_mut() {
        for (method, operation) in operations.iter_mut() {
            let entity = format!("paths.{}.{}", path, method);
            for parameter in operation.parameters.iter_mut() {
                resolver.visit_parameter(parameter, &format!("{}.parameters", entity));
            }
            if let Some(body) = operation.request_body.as_mut() {
                resolver.visit_request_body(body, &format!("{}.requestBody", entity));
            }
            for (status, response) in operation.responses.iter_mut() {
                resolver.visit_response(response, &format!("{}.responses.{}", entity, status));
            }
            for requirement in operation.security.iter().flatten() {
                for scheme in requirement.keys() {
                    if !model.components.security_schemes.contains_key(scheme) {
                        resolver.diagnostics.push(
                            Diagnostic::error(
                                Phase::Resolution,
                                format!("unknown security scheme '{}'", scheme),
                            )
                            .for_entity(&entity)
                            .at(operation.source.clone()),
                        );
                    }
                }
            }
        }
    }

    info!(
        "Resolved {} references with {} errors",
        resolver.resolved,
        resolver.diagnostics.len()
    );
    resolver.diagnostics
}

struct Resolver {
    present: HashSet<(Collection, String)>,
    /// Component schema -> component schemas reachable through references
    reach: HashMap<String, HashSet<String>>,
    diagnostics: Vec<Diagnostic>,
    resolved: usize,
}

impl Resolver {
    fn new(components: &Components) -> Self {
        let mut present = HashSet::new();
        present.extend(components.schemas.keys().map(|k| (Collection::Schemas, k.clone())));
        present.extend(components.parameters.keys().map(|k| (Collection::Parameters, k.clone())));
        present.extend(components.request_bodies.keys().map(|k| (Collection::RequestBodies, k.clone())));
        present.extend(components.responses.keys().map(|k| (Collection::Responses, k.clone())));

        Self {
            present,
            reach: schema_reachability(&components.schemas),
            diagnostics: Vec::new(),
            resolved: 0,
        }
    }

    fn resolve(&mut self, reference: &mut Reference, owner: Option<&str>, entity: &str) {
        if reference.collection != reference.expected {
            reference.state = RefState::Dangling;
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::Resolution,
                    format!(
                        "reference kind mismatch: {} points into {}, expected {}",
                        reference.pointer(),
                        reference.collection.as_str(),
                        reference.expected.as_str()
                    ),
                )
                .for_entity(entity)
                .at(reference.source.clone()),
            );
            return;
        }

        let key = (reference.collection, reference.name.clone());
        if !self.present.contains(&key) {
            reference.state = RefState::Dangling;
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::Resolution,
                    format!("unresolved reference to missing '{}'", reference.pointer()),
                )
                .for_entity(entity)
                .at(reference.source.clone()),
            );
            return;
        }

        let recursive = match owner {
            Some(owner) if reference.collection == Collection::Schemas => self
                .reach
                .get(&reference.name)
                .is_some_and(|reachable| reachable.contains(owner)),
            _ => false,
        };
        reference.state = if recursive {
            debug!("{} is recursive within {}", reference.pointer(), entity);
            RefState::Recursive
        } else {
            RefState::Resolved
        };
        self.resolved += 1;
    }

    fn visit_schema(&mut self, schema: &mut RefOr<SchemaNode>, owner: Option<&str>, entity: &str) {
        match schema {
            RefOr::Ref(reference) => self.resolve(reference, owner, entity),
            RefOr::Item(node) => {
                for (name, property) in node.properties.iter_mut() {
                    self.visit_schema(property, owner, &format!("{}.properties.{}", entity, name));
                }
                if let Some(items) = node.items.as_mut() {
                    self.visit_schema(items, owner, &format!("{}.items", entity));
                }
            }
        }
    }

    fn visit_parameter(&mut self, parameter: &mut RefOr<ParameterNode>, entity: &str) {
        match parameter {
            RefOr::Ref(reference) => self.resolve(reference, None, entity),
            RefOr::Item(node) => {
                let entity = format!("{}.{}", entity, node.name);
                if let Some(schema) = node.schema.as_mut() {
                    self.visit_schema(schema, None, &format!("{}.schema", entity));
                }
            }
        }
    }

    fn visit_request_body(&mut self, body: &mut RefOr<RequestBodyNode>, entity: &str) {
        match body {
            RefOr::Ref(reference) => self.resolve(reference, None, entity),
            RefOr::Item(node) => self.visit_content(&mut node.content, entity),
        }
    }

    fn visit_response(&mut self, response: &mut RefOr<ResponseNode>, entity: &str) {
        match response {
            RefOr::Ref(reference) => self.resolve(reference, None, entity),
            RefOr::Item(node) => self.visit_content(&mut node.content, entity),
        }
    }

    fn visit_content(&mut self, content: &mut IndexMap<String, MediaTypeNode>, entity: &str) {
        for (media_type, media) in content.iter_mut() {
            if let Some(schema) = media.schema.as_mut() {
                self.visit_schema(schema, None, &format!("{}.content.{}", entity, media_type));
            }
        }
    }

    /// Reports alias chains among parameters, request bodies and responses
    /// that loop back on themselves, once per cycle.
    fn check_alias_cycles(&mut self, components: &Components) {
        self.check_collection_cycles(Collection::Parameters, aliases(&components.parameters, Collection::Parameters));
        self.check_collection_cycles(
            Collection::RequestBodies,
            aliases(&components.request_bodies, Collection::RequestBodies),
        );
        self.check_collection_cycles(Collection::Responses, aliases(&components.responses, Collection::Responses));
    }

    fn check_collection_cycles(&mut self, collection: Collection, aliases: IndexMap<&str, &Reference>) {
        let mut reported: HashSet<BTreeSet<&str>> = HashSet::new();

        for &start in aliases.keys() {
            let mut chain: Vec<&str> = vec![start];
            let mut current = start;
            while let Some(reference) = aliases.get(current) {
                let next = reference.name.as_str();
                if let Some(pos) = chain.iter().position(|&n| n == next) {
                    let cycle = &chain[pos..];
                    let members: BTreeSet<&str> = cycle.iter().copied().collect();
                    if reported.insert(members) {
                        let mut rendered: Vec<&str> = cycle.to_vec();
                        rendered.push(next);
                        let first = aliases[cycle[0]];
                        self.diagnostics.push(
                            Diagnostic::error(
                                Phase::Resolution,
                                format!(
                                    "illegal reference cycle: {}",
                                    rendered.join(" -> ")
                                ),
                            )
                            .for_entity(format!("components.{}.{}", collection.as_str(), cycle[0]))
                            .at(first.source.clone()),
                        );
                    }
                    break;
                }
                chain.push(next);
                current = next;
            }
        }
    }
}

/// Components of one collection that are aliases of another in the same collection.
fn aliases<T>(registry: &IndexMap<String, RefOr<T>>, collection: Collection) -> IndexMap<&str, &Reference> {
    registry
        .iter()
        .filter_map(|(name, item)| match item {
            RefOr::Ref(reference) if reference.collection == collection => Some((name.as_str(), reference)),
            _ => None,
        })
        .collect()
}

/// Schema names referenced anywhere inside a schema tree.
fn schema_edges(schema: &RefOr<SchemaNode>, edges: &mut Vec<String>) {
    match schema {
        RefOr::Ref(reference) => {
            if reference.collection == Collection::Schemas {
                edges.push(reference.name.clone());
            }
        }
        RefOr::Item(node) => {
            for property in node.properties.values() {
                schema_edges(property, edges);
            }
            if let Some(items) = &node.items {
                schema_edges(items, edges);
            }
        }
    }
}

/// Transitive closure of the component schema reference graph.
fn schema_reachability(schemas: &IndexMap<String, RefOr<SchemaNode>>) -> HashMap<String, HashSet<String>> {
    let graph: HashMap<&str, Vec<String>> = schemas
        .iter()
        .map(|(name, schema)| {
            let mut edges = Vec::new();
            schema_edges(schema, &mut edges);
            (name.as_str(), edges)
        })
        .collect();

    let mut reach = HashMap::new();
    for &name in graph.keys() {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<&str> = graph[name].iter().map(String::as_str).collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(next.to_string()) {
                continue;
            }
            if let Some(edges) = graph.get(next) {
                stack.extend(edges.iter().map(String::as_str));
            }
        }
        reach.insert(name.to_string(), seen);
    }
    reach
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Position, SourceLocation};
    use crate::model::{HttpMethod, Operation, SchemaType, SecuritySchemeNode};

    fn loc(line: usize) -> SourceLocation {
        SourceLocation::new("api.php", Position::new(line, 1))
    }

    fn schema_ref(name: &str) -> RefOr<SchemaNode> {
        RefOr::Ref(Reference::parse(name, Collection::Schemas, loc(1)).unwrap())
    }

    fn object(properties: Vec<(&str, RefOr<SchemaNode>)>) -> RefOr<SchemaNode> {
        let mut schema = SchemaNode::typed(SchemaType::Object, loc(1));
        for (name, property) in properties {
            schema.properties.insert(name.to_string(), property);
        }
        RefOr::Item(schema)
    }

    fn operation(responses: Vec<(&str, RefOr<ResponseNode>)>) -> Operation {
        Operation {
            operation_id: "op".to_string(),
            tags: Vec::new(),
            summary: None,
            description: None,
            deprecated: false,
            parameters: Vec::new(),
            request_body: None,
            responses: responses.into_iter().map(|(s, r)| (s.to_string(), r)).collect(),
            security: None,
            source: loc(3),
        }
    }

    fn state(schema: &RefOr<SchemaNode>) -> RefState {
        schema.as_reference().unwrap().state
    }

    #[test]
    fn test_resolves_and_marks_recursion() {
        let mut model = DocumentModel::default();
        let schemas = &mut model.components.schemas;
        schemas.insert("Project".into(), object(vec![("owner", schema_ref("User"))]));
        schemas.insert("User".into(), object(vec![("manager", schema_ref("User"))]));
        schemas.insert(
            "Tree".into(),
            object(vec![("children", {
                let mut list = SchemaNode::typed(SchemaType::Array, loc(1));
                list.items = Some(Box::new(schema_ref("Tree")));
                RefOr::Item(list)
            })]),
        );

        let diagnostics = resolve(&mut model);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let schemas = &model.components.schemas;
        let project = schemas["Project"].as_item().unwrap();
        assert_eq!(state(&project.properties["owner"]), RefState::Resolved);
        let user = schemas["User"].as_item().unwrap();
        assert_eq!(state(&user.properties["manager"]), RefState::Recursive);
        let tree = schemas["Tree"].as_item().unwrap();
        let items = tree.properties["children"].as_item().unwrap().items.as_ref().unwrap();
        assert_eq!(state(items), RefState::Recursive);
    }

    #[test]
    fn test_mutual_recursion() {
        let mut model = DocumentModel::default();
        model.components.schemas.insert("A".into(), object(vec![("b", schema_ref("B"))]));
        model.components.schemas.insert("B".into(), object(vec![("a", schema_ref("A"))]));

        assert!(resolve(&mut model).is_empty());
        let a = model.components.schemas["A"].as_item().unwrap();
        assert_eq!(state(&a.properties["b"]), RefState::Recursive);
    }

    #[test]
    fn test_dangling_reference_reports_once() {
        let mut model = DocumentModel::default();
        let mut response = ResponseNode {
            description: "OK".into(),
            content: IndexMap::new(),
            source: loc(2),
        };
        response.content.insert(
            "application/json".into(),
            MediaTypeNode {
                schema: Some(schema_ref("Missing")),
                example: None,
            },
        );
        let mut operations = std::collections::BTreeMap::new();
        operations.insert(HttpMethod::Get, operation(vec![("200", RefOr::Item(response))]));
        model.paths.insert("/x".into(), operations);

        let diagnostics = resolve(&mut model);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].phase, Phase::Resolution);
        assert!(diagnostics[0].message.contains("#/components/schemas/Missing"));
        assert_eq!(diagnostics[0].entity.as_deref(), Some("paths./x.get.responses.200.content.application/json"));
        assert_eq!(diagnostics[0].location, Some(loc(1)));
    }

    #[test]
    fn test_reference_kind_mismatch() {
        let mut model = DocumentModel::default();
        model.components.schemas.insert("Project".into(), object(vec![]));
        let reference = Reference::parse("schemas/Project", Collection::Responses, loc(4)).unwrap();
        let mut operations = std::collections::BTreeMap::new();
        operations.insert(HttpMethod::Get, operation(vec![("200", RefOr::Ref(reference))]));
        model.paths.insert("/x".into(), operations);

        let diagnostics = resolve(&mut model);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.starts_with("reference kind mismatch"));
    }

    #[test]
    fn test_alias_cycle_reported_once() {
        let mut model = DocumentModel::default();
        let alias = |target: &str, line| RefOr::Ref(Reference::parse(target, Collection::Responses, loc(line)).unwrap());
        model.components.responses.insert("A".into(), alias("B", 1));
        model.components.responses.insert("B".into(), alias("A", 2));
        model.components.responses.insert("C".into(), alias("A", 3));

        let diagnostics = resolve(&mut model);
        let cycles: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.message.starts_with("illegal reference cycle"))
            .collect();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].message.contains("A -> B -> A"));
    }

    #[test]
    fn test_unknown_security_scheme() {
        let mut model = DocumentModel::default();
        model.components.security_schemes.insert(
            "bearer".into(),
            SecuritySchemeNode {
                scheme_type: "http".into(),
                description: None,
                name: None,
                location: None,
                scheme: Some("bearer".into()),
                bearer_format: None,
                source: loc(1),
            },
        );
        let mut op = operation(vec![]);
        let mut known = crate::model::SecurityRequirement::new();
        known.insert("bearer".into(), vec![]);
        let mut unknown = crate::model::SecurityRequirement::new();
        unknown.insert("oauth".into(), vec!["read".into()]);
        op.security = Some(vec![known, unknown]);
        let mut operations = std::collections::BTreeMap::new();
        operations.insert(HttpMethod::Post, op);
        model.paths.insert("/x".into(), operations);

        let diagnostics = resolve(&mut model);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("'oauth'"));
    }
}
