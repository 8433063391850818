//! Serialization module for lowering the Document Model into an OpenAPI
//! document and rendering it as YAML or JSON.
//!
//! Output is deterministic: paths are sorted, methods follow the canonical
//! order and component registries keep declaration order, so serializing an
//! unchanged model twice yields byte-identical text.

use crate::model::{
    Components, DocumentModel, HttpMethod, MediaTypeNode, ParameterNode, RefOr, RequestBodyNode,
    ResponseNode, SchemaNode, SecuritySchemeNode,
};
use crate::openapi::{self, OpenApiDocument, PathItem, ReferenceOr, OPENAPI_VERSION};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::debug;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Converts a resolved and validated model into the output document.
///
/// # Arguments
///
/// * `model` - The Document Model to lower
///
/// # Returns
///
/// Returns the OpenAPI document mirroring the model.
pub fn to_document(model: &DocumentModel) -> OpenApiDocument {
    debug!("Lowering document model with {} paths", model.paths.len());

    let info = openapi::Info {
        title: model.info.title.clone(),
        version: model.info.version.clone(),
        description: model.info.description.clone(),
        terms_of_service: model.info.terms_of_service.clone(),
        contact: model.info.contact.as_ref().map(|contact| openapi::Contact {
            name: contact.name.clone(),
            email: contact.email.clone(),
            url: contact.url.clone(),
        }),
        license: model.info.license.as_ref().map(|license| openapi::License {
            name: license.name.clone(),
            url: license.url.clone(),
        }),
    };

    let servers = model
        .servers
        .iter()
        .map(|server| openapi::Server {
            url: server.url.clone(),
            description: server.description.clone(),
        })
        .collect();

    let tags = model
        .tags
        .values()
        .map(|tag| openapi::Tag {
            name: tag.name.clone(),
            description: tag.description.clone(),
        })
        .collect();

    let paths = model
        .paths
        .iter()
        .map(|(path, operations)| {
            let mut item = PathItem::default();
            for (method, operation) in operations {
                *method_slot(&mut item, *method) = Some(lower_operation(operation));
            }
            (path.clone(), item)
        })
        .collect();

    let components = if model.components.is_empty() {
        None
    } else {
        Some(lower_components(&model.components))
    };

    OpenApiDocument {
        openapi: OPENAPI_VERSION.to_string(),
        info,
        servers,
        tags,
        paths,
        components,
    }
}

fn method_slot(item: &mut PathItem, method: HttpMethod) -> &mut Option<openapi::Operation> {
    match method {
        HttpMethod::Get => &mut item.get,
        HttpMethod::Put => &mut item.put,
        HttpMethod::Post => &mut item.post,
        HttpMethod::Delete => &mut item.delete,
        HttpMethod::Options => &mut item.options,
        HttpMethod::Head => &mut item.head,
        HttpMethod::Patch => &mut item.patch,
        HttpMethod::Trace => &mut item.trace,
    }
}

fn lower_operation(operation: &crate::model::Operation) -> openapi::Operation {
    openapi::Operation {
        tags: operation.tags.clone(),
        summary: operation.summary.clone(),
        description: operation.description.clone(),
        operation_id: operation.operation_id.clone(),
        parameters: operation
            .parameters
            .iter()
            .map(|parameter| lower_ref(parameter, lower_parameter))
            .collect(),
        request_body: operation
            .request_body
            .as_ref()
            .map(|body| lower_ref(body, lower_request_body)),
        responses: lower_map(&operation.responses, lower_response),
        deprecated: operation.deprecated,
        security: operation.security.clone(),
    }
}

fn lower_components(components: &Components) -> openapi::Components {
    openapi::Components {
        schemas: lower_map(&components.schemas, lower_schema),
        parameters: lower_map(&components.parameters, lower_parameter),
        request_bodies: lower_map(&components.request_bodies, lower_request_body),
        responses: lower_map(&components.responses, lower_response),
        security_schemes: components
            .security_schemes
            .iter()
            .map(|(name, scheme)| (name.clone(), lower_security_scheme(scheme)))
            .collect(),
    }
}

fn lower_ref<T, U>(node: &RefOr<T>, lower: fn(&T) -> U) -> ReferenceOr<U> {
    match node {
        RefOr::Item(item) => ReferenceOr::Item(lower(item)),
        RefOr::Ref(reference) => ReferenceOr::reference(reference.pointer()),
    }
}

fn lower_map<T, U>(
    nodes: &IndexMap<String, RefOr<T>>,
    lower: fn(&T) -> U,
) -> IndexMap<String, ReferenceOr<U>> {
    nodes
        .iter()
        .map(|(name, node)| (name.clone(), lower_ref(node, lower)))
        .collect()
}

fn lower_schema(schema: &SchemaNode) -> openapi::Schema {
    openapi::Schema {
        title: schema.title.clone(),
        description: schema.description.clone(),
        schema_type: schema.schema_type.map(|t| t.as_str().to_string()),
        format: schema.format.clone(),
        nullable: schema.nullable,
        required: schema.required.clone(),
        properties: lower_map(&schema.properties, lower_schema),
        items: schema
            .items
            .as_ref()
            .map(|items| Box::new(lower_ref(items, lower_schema))),
        enum_values: schema.enum_values.clone(),
        example: schema.example.clone(),
    }
}

fn lower_parameter(parameter: &ParameterNode) -> openapi::Parameter {
    openapi::Parameter {
        name: parameter.name.clone(),
        location: parameter.location.as_str().to_string(),
        required: parameter.required,
        description: parameter.description.clone(),
        deprecated: parameter.deprecated,
        schema: parameter
            .schema
            .as_ref()
            .map(|schema| lower_ref(schema, lower_schema)),
        example: parameter.example.clone(),
    }
}

fn lower_request_body(body: &RequestBodyNode) -> openapi::RequestBody {
    openapi::RequestBody {
        description: body.description.clone(),
        required: body.required,
        content: lower_content(&body.content),
    }
}

fn lower_response(response: &ResponseNode) -> openapi::Response {
    openapi::Response {
        description: response.description.clone(),
        content: lower_content(&response.content),
    }
}

fn lower_content(content: &IndexMap<String, MediaTypeNode>) -> IndexMap<String, openapi::MediaType> {
    content
        .iter()
        .map(|(media_type, node)| {
            let lowered = openapi::MediaType {
                schema: node.schema.as_ref().map(|schema| lower_ref(schema, lower_schema)),
                example: node.example.clone(),
            };
            (media_type.clone(), lowered)
        })
        .collect()
}

fn lower_security_scheme(scheme: &SecuritySchemeNode) -> openapi::SecurityScheme {
    openapi::SecurityScheme {
        scheme_type: scheme.scheme_type.clone(),
        description: scheme.description.clone(),
        name: scheme.name.clone(),
        location: scheme.location.clone(),
        scheme: scheme.scheme.clone(),
        bearer_format: scheme.bearer_format.clone(),
    }
}

/// Serializes an OpenAPI document to YAML format.
///
/// # Arguments
///
/// * `doc` - The OpenAPI document to serialize
///
/// # Returns
///
/// Returns the YAML string representation of the document.
///
/// # Errors
///
/// Returns an error if serialization fails.
///
/// # Example
///
/// ```ignore
/// use openapi_from_annotations::serializer::{serialize_yaml, to_document};
///
/// let doc = to_document(&model);
/// let yaml = serialize_yaml(&doc).unwrap();
/// println!("{}", yaml);
/// ```
pub fn serialize_yaml(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    serde_yaml::to_string(doc).context("Failed to serialize OpenAPI document to YAML")
}

/// Serializes an OpenAPI document to JSON format with pretty printing.
///
/// # Arguments
///
/// * `doc` - The OpenAPI document to serialize
///
/// # Returns
///
/// Returns the JSON string representation of the document.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_json(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    serde_json::to_string_pretty(doc).context("Failed to serialize OpenAPI document to JSON")
}

/// Writes string content to a file atomically.
///
/// The content goes to a temporary file next to `path`, which is then renamed
/// into place. Readers see either the previous file or the complete new one.
/// Parent directories are created when missing.
///
/// # Arguments
///
/// * `content` - The string content to write
/// * `path` - The file path to write to
///
/// # Errors
///
/// Returns an error if the directory, the temporary file or the final rename
/// fails.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    temp.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace file: {}", path.display()))?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
