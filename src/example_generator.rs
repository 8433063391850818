//! Example synthesis for media types that declare a schema but no example.
//!
//! Explicit schema examples win, then the first enum value, then a default
//! for the schema type. References are followed into the component registry;
//! recursive references and alias loops stop expansion with `null`.

use crate::model::{DocumentModel, MediaTypeNode, RefOr, RefState, SchemaNode, SchemaType};
use indexmap::IndexMap;
use log::debug;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Fills the `example` of every media type that has a schema but no example.
///
/// Returns the number of examples generated.
pub fn synthesize_examples(model: &mut DocumentModel) -> usize {
    let schemas = &model.components.schemas;
    let mut generated = 0;

    for operations in model.paths.values_mut() {
        for operation in operations.values_mut() {
            if let Some(RefOr::Item(body)) = operation.request_body.as_mut() {
                generated += fill_content(&mut body.content, schemas);
            }
            for response in operation.responses.values_mut() {
                if let RefOr::Item(response) = response {
                    generated += fill_content(&mut response.content, schemas);
                }
            }
        }
    }

    for body in model.components.request_bodies.values_mut() {
        if let RefOr::Item(body) = body {
            generated += fill_content(&mut body.content, schemas);
        }
    }
    for response in model.components.responses.values_mut() {
        if let RefOr::Item(response) = response {
            generated += fill_content(&mut response.content, schemas);
        }
    }

    debug!("Synthesized {} media type examples", generated);
    generated
}

fn fill_content(
    content: &mut IndexMap<String, MediaTypeNode>,
    schemas: &IndexMap<String, RefOr<SchemaNode>>,
) -> usize {
    let mut generated = 0;
    for media in content.values_mut() {
        if media.example.is_some() {
            continue;
        }
        if let Some(schema) = &media.schema {
            media.example = Some(example_for(schema, schemas, &mut HashSet::new()));
            generated += 1;
        }
    }
    generated
}

/// Builds an example value for a schema or schema reference.
pub fn example_for<'a>(
    schema: &'a RefOr<SchemaNode>,
    schemas: &'a IndexMap<String, RefOr<SchemaNode>>,
    visiting: &mut HashSet<&'a str>,
) -> Value {
    match schema {
        RefOr::Ref(reference) => {
            if reference.state == RefState::Recursive || visiting.contains(reference.name.as_str()) {
                return Value::Null;
            }
            let Some(target) = schemas.get(&reference.name) else {
                return Value::Null;
            };
            visiting.insert(reference.name.as_str());
            let value = example_for(target, schemas, visiting);
            visiting.remove(reference.name.as_str());
            value
        }
        RefOr::Item(node) => example_for_node(node, schemas, visiting),
    }
}

fn example_for_node<'a>(
    node: &'a SchemaNode,
    schemas: &'a IndexMap<String, RefOr<SchemaNode>>,
    visiting: &mut HashSet<&'a str>,
) -> Value {
    if let Some(example) = &node.example {
        return example.clone();
    }
    if let Some(first) = node.enum_values.first() {
        return first.clone();
    }

    let schema_type = node.schema_type.or(if node.properties.is_empty() {
        None
    } else {
        Some(SchemaType::Object)
    });

    match schema_type {
        Some(SchemaType::Object) => {
            let mut object = Map::new();
            for (name, property) in &node.properties {
                object.insert(name.clone(), example_for(property, schemas, visiting));
            }
            Value::Object(object)
        }
        Some(SchemaType::Array) => match &node.items {
            Some(items) => {
                let item = example_for(items, schemas, visiting);
                if item.is_null() {
                    json!([])
                } else {
                    json!([item])
                }
            }
            None => json!([]),
        },
        Some(SchemaType::String) => string_example(node.format.as_deref()),
        Some(SchemaType::Integer) => json!(0),
        Some(SchemaType::Number) => json!(0.0),
        Some(SchemaType::Boolean) => json!(false),
        None => Value::Null,
    }
}

fn string_example(format: Option<&str>) -> Value {
    let example = match format {
        Some("date") => "2024-01-01",
        Some("date-time") => "2024-01-01T00:00:00Z",
        Some("email") => "user@example.com",
        Some("uuid") => "00000000-0000-0000-0000-000000000000",
        Some("uri") | Some("url") => "https://example.com",
        _ => "string",
    };
    Value::String(example.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Position, SourceLocation};
    use crate::model::{Collection, HttpMethod, Operation, Reference, ResponseNode};
    use std::collections::BTreeMap;

    fn loc() -> SourceLocation {
        SourceLocation::new("Project.php", Position::new(1, 1))
    }

    fn schema_ref(name: &str, state: RefState) -> RefOr<SchemaNode> {
        let mut reference = Reference::parse(name, Collection::Schemas, loc()).unwrap();
        reference.state = state;
        RefOr::Ref(reference)
    }

    fn typed(schema_type: SchemaType) -> RefOr<SchemaNode> {
        RefOr::Item(SchemaNode::typed(schema_type, loc()))
    }

    fn model_with_response(schema: RefOr<SchemaNode>, example: Option<Value>) -> DocumentModel {
        let mut content = IndexMap::new();
        content.insert(
            "application/json".to_string(),
            MediaTypeNode {
                schema: Some(schema),
                example,
            },
        );
        let mut responses = IndexMap::new();
        responses.insert(
            "200".to_string(),
            RefOr::Item(ResponseNode {
                description: "OK".to_string(),
                content,
                source: loc(),
            }),
        );
        let operation = Operation {
            operation_id: "showProject".to_string(),
            tags: Vec::new(),
            summary: None,
            description: None,
            deprecated: false,
            parameters: Vec::new(),
            request_body: None,
            responses,
            security: None,
            source: loc(),
        };

        let mut model = DocumentModel::default();
        model
            .paths
            .insert("/projects/{id}".to_string(), BTreeMap::from([(HttpMethod::Get, operation)]));

        let mut project = SchemaNode::typed(SchemaType::Object, loc());
        project.properties.insert("id".to_string(), typed(SchemaType::Integer));
        let mut name = SchemaNode::typed(SchemaType::String, loc());
        name.example = Some(json!("Apollo"));
        project.properties.insert("name".to_string(), RefOr::Item(name));
        let mut created = SchemaNode::typed(SchemaType::String, loc());
        created.format = Some("date-time".to_string());
        project.properties.insert("created_at".to_string(), RefOr::Item(created));
        project
            .properties
            .insert("parent".to_string(), schema_ref("Project", RefState::Recursive));
        model.components.schemas.insert("Project".to_string(), RefOr::Item(project));
        model
    }

    fn response_example(model: &DocumentModel) -> Option<&Value> {
        let operation = &model.paths["/projects/{id}"][&HttpMethod::Get];
        operation.responses["200"].as_item().unwrap().content["application/json"]
            .example
            .as_ref()
    }

    #[test]
    fn test_expands_references_and_stops_at_recursion() {
        let mut model = model_with_response(schema_ref("Project", RefState::Resolved), None);

        assert_eq!(synthesize_examples(&mut model), 1);
        assert_eq!(
            response_example(&model),
            Some(&json!({
                "id": 0,
                "name": "Apollo",
                "created_at": "2024-01-01T00:00:00Z",
                "parent": null
            }))
        );
    }

    #[test]
    fn test_explicit_media_example_wins() {
        let mut model = model_with_response(
            schema_ref("Project", RefState::Resolved),
            Some(json!({"id": 7})),
        );

        assert_eq!(synthesize_examples(&mut model), 0);
        assert_eq!(response_example(&model), Some(&json!({"id": 7})));
    }

    #[test]
    fn test_array_and_enum_defaults() {
        let mut status = SchemaNode::typed(SchemaType::String, loc());
        status.enum_values = vec![json!("active"), json!("archived")];
        let mut list = SchemaNode::typed(SchemaType::Array, loc());
        list.items = Some(Box::new(RefOr::Item(status)));

        let schemas = IndexMap::new();
        let value = example_for(&RefOr::Item(list), &schemas, &mut HashSet::new());
        assert_eq!(value, json!(["active"]));
    }

    #[test]
    fn test_alias_loop_yields_null() {
        let mut schemas = IndexMap::new();
        schemas.insert("A".to_string(), schema_ref("B", RefState::Resolved));
        schemas.insert("B".to_string(), schema_ref("A", RefState::Resolved));

        let value = example_for(&schema_ref("A", RefState::Resolved), &schemas, &mut HashSet::new());
        assert_eq!(value, Value::Null);
    }
}
