//! Semantic validation of a resolved [`DocumentModel`].
//!
//! Every rule runs over the whole model and all violations are collected; a
//! failing rule never hides the ones after it.

use crate::error::{Diagnostic, Phase, SourceLocation};
use crate::model::{
    path_placeholders, DocumentModel, MediaTypeNode, Operation, ParameterLocation, ParameterNode,
    RefOr, ResponseNode, SchemaNode,
};
use indexmap::IndexMap;
use log::info;
use std::collections::{BTreeSet, HashMap};

pub const OPERATION_HAS_RESPONSE: &str = "operation-has-response";
pub const UNIQUE_OPERATION_ID: &str = "unique-operation-id";
pub const PARAMETER_SHAPE: &str = "parameter-shape";
pub const PATH_PARAMETER_PLACEHOLDER: &str = "path-parameter-placeholder";
pub const REQUIRED_PROPERTY_DECLARED: &str = "required-property-declared";
pub const STATUS_CODE: &str = "status-code";
pub const UNRESOLVED_CONSTANT: &str = "unresolved-constant";
pub const PATH_PARAMETER_REQUIRED: &str = "path-parameter-required";

/// Checks every rule and returns the violations in traversal order.
pub fn validate(model: &DocumentModel) -> Vec<Diagnostic> {
    let mut validator = Validator {
        model,
        diagnostics: Vec::new(),
    };
    validator.check_constants();
    validator.check_components();
    validator.check_operations();

    info!("Validation found {} violations", validator.diagnostics.len());
    validator.diagnostics
}

struct Validator<'m> {
    model: &'m DocumentModel,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> Validator<'m> {
    fn violation(&mut self, rule: &str, entity: &str, message: impl Into<String>, location: Option<&SourceLocation>) {
        self.diagnostics.push(
            Diagnostic::error(Phase::Validation, message)
                .with_rule(rule)
                .for_entity(entity)
                .at_opt(location.cloned()),
        );
    }

    fn check_constants(&mut self) {
        let model = self.model;
        for constant in &model.unresolved_constants {
            self.violation(
                UNRESOLVED_CONSTANT,
                &constant.entity,
                format!("constant '{}' is not defined", constant.name),
                Some(&constant.source),
            );
        }
    }

    fn check_components(&mut self) {
        let model = self.model;
        let components = &model.components;
        for (name, schema) in &components.schemas {
            self.check_schema(schema, &format!("components.schemas.{}", name));
        }
        for (name, parameter) in &components.parameters {
            if let RefOr::Item(parameter) = parameter {
                self.check_parameter(parameter, &format!("components.parameters.{}", name));
            }
        }
        for (name, body) in &components.request_bodies {
            if let RefOr::Item(body) = body {
                self.check_content(&body.content, &format!("components.requestBodies.{}", name));
            }
        }
        for (name, response) in &components.responses {
            if let RefOr::Item(response) = response {
                self.check_content(&response.content, &format!("components.responses.{}", name));
            }
        }
    }

    fn check_operations(&mut self) {
        let model = self.model;
        let mut operation_ids: HashMap<&str, &SourceLocation> = HashMap::new();

        for (path, operations) in &model.paths {
            for (method, operation) in operations {
                let entity = format!("paths.{}.{}", path, method);

                // (a)
                if operation.responses.is_empty() {
                    self.violation(OPERATION_HAS_RESPONSE, &entity, "operation declares no responses", Some(&operation.source));
                }

                // (b)
                match operation_ids.get(operation.operation_id.as_str()) {
                    Some(first) => {
                        let message = format!(
                            "operationId '{}' already used at {}",
                            operation.operation_id, first
                        );
                        self.violation(UNIQUE_OPERATION_ID, &entity, message, Some(&operation.source));
                    }
                    None => {
                        operation_ids.insert(&operation.operation_id, &operation.source);
                    }
                }

                for parameter in operation.parameters.iter().filter_map(|p| p.as_item()) {
                    self.check_parameter(parameter, &format!("{}.parameters.{}", entity, parameter.name));
                }
                self.check_path_parameters(path, operation, &entity);

                if let Some(RefOr::Item(body)) = &operation.request_body {
                    self.check_content(&body.content, &format!("{}.requestBody", entity));
                }

                for (status, response) in &operation.responses {
                    let response_entity = format!("{}.responses.{}", entity, status);
                    // (f)
                    if !is_valid_status(status) {
                        let location = response_location(response).unwrap_or(&operation.source);
                        self.violation(
                            STATUS_CODE,
                            &response_entity,
                            format!("'{}' is not a 3-digit status code or 'default'", status),
                            Some(location),
                        );
                    }
                    if let RefOr::Item(response) = response {
                        self.check_content(&response.content, &response_entity);
                    }
                }
            }
        }
    }

    /// (c) and (h) for one parameter.
    fn check_parameter(&mut self, parameter: &ParameterNode, entity: &str) {
        if parameter.name.trim().is_empty() {
            self.violation(PARAMETER_SHAPE, entity, "parameter has no name", Some(&parameter.source));
        }
        match &parameter.location {
            ParameterLocation::Unrecognized(location) if location.is_empty() => {
                self.violation(PARAMETER_SHAPE, entity, "parameter has no location", Some(&parameter.source));
            }
            ParameterLocation::Unrecognized(location) => {
                self.violation(
                    PARAMETER_SHAPE,
                    entity,
                    format!("unrecognized parameter location '{}'", location),
                    Some(&parameter.source),
                );
            }
            ParameterLocation::Path if !parameter.required => {
                self.violation(
                    PATH_PARAMETER_REQUIRED,
                    entity,
                    format!("path parameter '{}' must be required", parameter.name),
                    Some(&parameter.source),
                );
            }
            _ => {}
        }
        if let Some(schema) = &parameter.schema {
            self.check_schema(schema, &format!("{}.schema", entity));
        }
    }

    /// (d): path parameters and URL placeholders must match both ways.
    fn check_path_parameters(&mut self, path: &'m str, operation: &'m Operation, entity: &str) {
        let placeholders: BTreeSet<&str> = path_placeholders(path).into_iter().collect();
        let mut declared: BTreeSet<&str> = BTreeSet::new();

        for parameter in &operation.parameters {
            let Some(parameter) = self.follow_parameter(parameter) else {
                continue;
            };
            if parameter.location != ParameterLocation::Path {
                continue;
            }
            declared.insert(parameter.name.as_str());
            if !placeholders.contains(parameter.name.as_str()) {
                self.violation(
                    PATH_PARAMETER_PLACEHOLDER,
                    entity,
                    format!("path parameter '{}' has no {{{}}} placeholder in '{}'", parameter.name, parameter.name, path),
                    Some(&parameter.source),
                );
            }
        }

        for placeholder in placeholders.difference(&declared) {
            self.violation(
                PATH_PARAMETER_PLACEHOLDER,
                entity,
                format!("placeholder {{{}}} has no matching path parameter", placeholder),
                Some(&operation.source),
            );
        }
    }

    /// Follows parameter aliases to the declared parameter, if any.
    fn follow_parameter(&self, parameter: &'m RefOr<ParameterNode>) -> Option<&'m ParameterNode> {
        let parameters = &self.model.components.parameters;
        let mut current = parameter;
        for _ in 0..=parameters.len() {
            match current {
                RefOr::Item(parameter) => return Some(parameter),
                RefOr::Ref(reference) => current = parameters.get(&reference.name)?,
            }
        }
        None
    }

    /// (e), recursively through inline subschemas.
    fn check_schema(&mut self, schema: &RefOr<SchemaNode>, entity: &str) {
        let RefOr::Item(schema) = schema else {
            return;
        };
        for name in &schema.required {
            if !schema.properties.contains_key(name) {
                self.violation(
                    REQUIRED_PROPERTY_DECLARED,
                    entity,
                    format!("required property '{}' is not declared", name),
                    Some(&schema.source),
                );
            }
        }
        for (name, property) in &schema.properties {
            self.check_schema(property, &format!("{}.properties.{}", entity, name));
        }
        if let Some(items) = &schema.items {
            self.check_schema(items, &format!("{}.items", entity));
        }
    }

    fn check_content(&mut self, content: &IndexMap<String, MediaTypeNode>, entity: &str) {
        for (media_type, media) in content {
            if let Some(schema) = &media.schema {
                self.check_schema(schema, &format!("{}.content.{}", entity, media_type));
            }
        }
    }
}

fn response_location(response: &RefOr<ResponseNode>) -> Option<&SourceLocation> {
    match response {
        RefOr::Item(response) => Some(&response.source),
        RefOr::Ref(reference) => Some(&reference.source),
    }
}

/// A 3-digit HTTP status code (100-599) or `default`.
pub fn is_valid_status(status: &str) -> bool {
    if status == "default" {
        return true;
    }
    status.len() == 3
        && status.bytes().all(|b| b.is_ascii_digit())
        && matches!(status.as_bytes()[0], b'1'..=b'5')
}
