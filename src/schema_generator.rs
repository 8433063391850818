use crate::annotation::AnnotationNode;
use crate::error::SourceLocation;
use crate::model::{Collection, Located, RefOr, RefState, Reference, SchemaNode, SchemaType};
use crate::model_builder::BuildContext;
use crate::type_resolver::{resolve_declared_type, PrimitiveType, ResolvedType, TypeKind};
use log::debug;
use serde_json::Value;

/// Attributes understood by `@Schema`, `@Property`, `@Items` and `@JsonContent`.
const SCHEMA_ATTRIBUTES: &[&str] = &[
    "schema",
    "property",
    "title",
    "description",
    "type",
    "format",
    "nullable",
    "required",
    "ref",
    "example",
    "enum",
];

/// Converts a schema-like tag into a schema or a reference.
///
/// `@Property` children become properties, an `@Items` child becomes the
/// array element schema. On a `@Property` the `required` flag belongs to the
/// enclosing schema and is read by the caller.
pub(crate) fn schema_from_tag(cx: &mut BuildContext, node: &AnnotationNode, entity: &str) -> RefOr<SchemaNode> {
    cx.check_attributes(node, SCHEMA_ATTRIBUTES, entity);
    cx.check_children(node, &["Property", "Items"], entity);

    if node.attr("ref").is_some() {
        if let Some(reference) = cx.reference(node, "ref", Collection::Schemas, entity) {
            warn_dropped_metadata(cx, node, entity, &reference);
            return RefOr::Ref(reference);
        }
    }

    let mut schema = SchemaNode::new(cx.location(node.position));
    apply_attributes(cx, node, entity, &mut schema);
    if node.name != "Property" {
        schema.required = cx.strings(node, "required", entity);
    }

    for child in node.nested("Property") {
        let Some(name) = cx.required_string(child, "property", entity) else {
            continue;
        };
        let property_entity = format!("{}.properties.{}", entity, name);
        if let Some(first) = schema.properties.get(&name) {
            let first = first.source().to_string();
            cx.error(child, &property_entity, format!("duplicate property '{}' first declared at {}", name, first));
            continue;
        }
        if cx.bool(child, "required", &property_entity) == Some(true) && !schema.required.contains(&name) {
            schema.required.push(name.clone());
        }
        let property = schema_from_tag(cx, child, &property_entity);
        schema.properties.insert(name, property);
    }

    let mut items = node.nested("Items");
    if let Some(child) = items.next() {
        let element = schema_from_tag(cx, child, &format!("{}.items", entity));
        schema.items = Some(Box::new(element));
        schema.schema_type.get_or_insert(SchemaType::Array);
    }
    for extra in items {
        cx.error(extra, entity, "schema declares more than one @Items");
    }

    if schema.schema_type.is_none() && !schema.properties.is_empty() {
        schema.schema_type = Some(SchemaType::Object);
    }
    RefOr::Item(schema)
}

/// Scalar schema attributes shared by every schema-like tag.
fn apply_attributes(cx: &mut BuildContext, node: &AnnotationNode, entity: &str, schema: &mut SchemaNode) {
    schema.title = cx.string(node, "title", entity);
    schema.description = cx.string(node, "description", entity);
    schema.format = cx.string(node, "format", entity);
    schema.nullable = cx.bool(node, "nullable", entity).unwrap_or(false);
    schema.example = cx.json(node, "example", entity);

    if let Some(raw) = cx.string(node, "type", entity) {
        match SchemaType::parse(&raw) {
            Some(schema_type) => schema.schema_type = Some(schema_type),
            None => cx.error(node, entity, format!("unknown schema type '{}'", raw)),
        }
    }

    match cx.json(node, "enum", entity) {
        Some(Value::Array(values)) => schema.enum_values = values,
        Some(other) => cx.error(node, entity, format!("attribute 'enum' must be an array, found {}", other)),
        None => {}
    }
}

/// Builds the schema of a top-level `@Property` on a field.
///
/// Without an explicit `type` or `ref`, the schema is inferred from the
/// field's declared type and the annotation's attributes are laid over it.
pub(crate) fn field_property(
    cx: &mut BuildContext,
    node: &AnnotationNode,
    declared_type: Option<&str>,
    entity: &str,
) -> RefOr<SchemaNode> {
    let explicit = schema_from_tag(cx, node, entity);
    if node.attr("type").is_some() {
        return explicit;
    }
    let (Some(declared), RefOr::Item(annotated)) = (declared_type, &explicit) else {
        return explicit;
    };

    debug!("Inferring schema of {} from declared type {}", entity, declared);
    match schema_from_declared_type(declared, annotated.source.clone()) {
        RefOr::Item(mut inferred) => {
            inferred.title = annotated.title.clone().or(inferred.title);
            inferred.description = annotated.description.clone();
            inferred.format = annotated.format.clone().or(inferred.format);
            inferred.nullable |= annotated.nullable;
            inferred.example = annotated.example.clone();
            if !annotated.enum_values.is_empty() {
                inferred.enum_values = annotated.enum_values.clone();
            }
            if !annotated.properties.is_empty() {
                inferred.properties = annotated.properties.clone();
                inferred.required = annotated.required.clone();
            }
            if annotated.items.is_some() {
                inferred.items = annotated.items.clone();
            }
            RefOr::Item(inferred)
        }
        RefOr::Ref(reference) => {
            warn_dropped_metadata(cx, node, entity, &reference);
            RefOr::Ref(reference)
        }
    }
}

/// Attributes a `$ref` schema cannot carry in OpenAPI 3.0.
const REF_SIBLING_ATTRIBUTES: &[&str] = &["title", "description", "format", "nullable", "example", "enum"];

/// Warns when a schema that lowers to a plain reference also declares
/// attributes that serialization has to drop.
fn warn_dropped_metadata(cx: &mut BuildContext, node: &AnnotationNode, entity: &str, reference: &Reference) {
    let dropped: Vec<&str> = REF_SIBLING_ATTRIBUTES
        .iter()
        .copied()
        .filter(|key| node.attr(key).is_some())
        .collect();
    if dropped.is_empty() {
        return;
    }
    cx.warning(
        node,
        entity,
        format!(
            "attributes {} dropped: schema is a reference to '{}'",
            dropped.join(", "),
            reference.pointer()
        ),
    );
}

/// Schema for a declared type string (`Vec<Project>`, `?int`, ...).
pub fn schema_from_declared_type(raw: &str, source: SourceLocation) -> RefOr<SchemaNode> {
    resolved_to_schema(&resolve_declared_type(raw), source)
}

fn resolved_to_schema(resolved: &ResolvedType, source: SourceLocation) -> RefOr<SchemaNode> {
    let mut schema = match &resolved.kind {
        TypeKind::Primitive(primitive) => primitive_to_schema(primitive, source),
        TypeKind::Array(element) => {
            let items = resolved_to_schema(element, source.clone());
            let mut schema = SchemaNode::typed(SchemaType::Array, source);
            schema.items = Some(Box::new(items));
            schema
        }
        TypeKind::Map => SchemaNode::typed(SchemaType::Object, source),
        TypeKind::Named(name) => {
            return RefOr::Ref(Reference {
                collection: Collection::Schemas,
                name: name.clone(),
                expected: Collection::Schemas,
                state: RefState::Pending,
                source,
            });
        }
        TypeKind::Unknown => SchemaNode::new(source),
    };
    schema.nullable = resolved.nullable;
    RefOr::Item(schema)
}

/// Convert a primitive type to an OpenAPI schema
fn primitive_to_schema(primitive: &PrimitiveType, source: SourceLocation) -> SchemaNode {
    let (schema_type, format) = match primitive {
        PrimitiveType::String | PrimitiveType::Char => (SchemaType::String, None),
        PrimitiveType::I8 | PrimitiveType::I16 | PrimitiveType::I32 => (SchemaType::Integer, Some("int32")),
        PrimitiveType::I64 | PrimitiveType::I128 => (SchemaType::Integer, Some("int64")),
        PrimitiveType::U8 | PrimitiveType::U16 | PrimitiveType::U32 => (SchemaType::Integer, Some("int32")),
        PrimitiveType::U64 | PrimitiveType::U128 => (SchemaType::Integer, Some("int64")),
        PrimitiveType::F32 => (SchemaType::Number, Some("float")),
        PrimitiveType::F64 => (SchemaType::Number, Some("double")),
        PrimitiveType::Number => (SchemaType::Number, None),
        PrimitiveType::Bool => (SchemaType::Boolean, None),
        PrimitiveType::Date => (SchemaType::String, Some("date")),
        PrimitiveType::DateTime => (SchemaType::String, Some("date-time")),
    };

    let mut schema = SchemaNode::typed(schema_type, source);
    schema.format = format.map(|s| s.to_string());
    schema
}
