use openapi_from_annotations::{
    config::CompilerConfig,
    error::{Phase, Severity},
    pipeline::Compiler,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_cross_file_schema_resolution() {
    // Rust task handlers reference the Project schema declared in a PHP model
    let mut config = CompilerConfig::with_roots(vec![fixture("projects"), fixture("tasks")]);
    config.define("PER_PAGE=15").unwrap();

    let output = Compiler::new(config).compile().unwrap();
    assert_eq!(output.stats.located, 4);
    assert_eq!(output.fatal_count(), 0, "{:#?}", output.diagnostics);

    let doc = serde_json::to_value(output.document.unwrap()).unwrap();

    assert_eq!(
        doc["components"]["schemas"]["Task"],
        json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": "integer", "format": "int64"},
                "title": {"type": "string", "description": "Short title"},
                "project": {"$ref": "#/components/schemas/Project"},
                "labels": {"type": "array", "items": {"type": "string"}}
            }
        })
    );

    let tasks = &doc["paths"]["/projects/{project}/tasks"]["get"];
    assert_eq!(tasks["operationId"], "TaskHandlers_list_tasks");
    assert_eq!(
        tasks["responses"]["200"]["content"]["application/json"]["schema"],
        json!({"type": "array", "items": {"$ref": "#/components/schemas/Task"}})
    );

    let tag_names: Vec<_> = doc["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tag| tag["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(tag_names, vec!["Projects", "Tasks"]);
}

#[test]
fn test_missing_cross_file_target_is_dangling() {
    let output = Compiler::new(CompilerConfig::with_roots(vec![fixture("tasks")]))
        .compile()
        .unwrap();

    let resolution: Vec<_> = output
        .diagnostics
        .iter()
        .filter(|d| d.phase == Phase::Resolution && d.severity == Severity::Error)
        .collect();
    assert_eq!(resolution.len(), 1, "{:#?}", output.diagnostics);
    assert!(resolution[0].message.contains("#/components/schemas/Project"));
    assert!(resolution[0].location.as_ref().unwrap().path.ends_with("tasks.rs"));
    assert!(output.document.is_none());
}

#[test]
fn test_properties_attach_across_units() {
    // The schema and its field properties live in separate files
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("a_schema.php"),
        "<?php\n/**\n * @OA\\Schema(schema=\"Invoice\")\n */\nclass Invoice {}\n",
    )
    .unwrap();
    std::fs::write(
        temp_dir.path().join("b_fields.php"),
        "<?php\nclass Invoice\n{\n    /**\n     * @OA\\Property(required=true)\n     */\n    public float $total;\n}\n",
    )
    .unwrap();

    let output = Compiler::new(CompilerConfig::with_roots(vec![temp_dir.path().to_path_buf()]))
        .compile()
        .unwrap();
    let doc = serde_json::to_value(output.document.unwrap()).unwrap();

    assert_eq!(
        doc["components"]["schemas"]["Invoice"],
        json!({
            "type": "object",
            "required": ["total"],
            "properties": {"total": {"type": "number", "format": "float"}}
        })
    );
}

#[test]
fn test_orphan_property_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("Receipt.php"),
        "<?php\nclass Receipt\n{\n    /**\n     * @OA\\Property\n     */\n    public string $code;\n}\n",
    )
    .unwrap();

    let output = Compiler::new(CompilerConfig::with_roots(vec![temp_dir.path().to_path_buf()]))
        .compile()
        .unwrap();

    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.phase == Phase::Build && d.message.contains("orphan property")));
    assert!(output.document.is_none());
}
