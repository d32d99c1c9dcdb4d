// Copyright 2025 Oxide Computer Company

use std::sync::Arc;

use serde_json::json;
use skew::{compare_locations, DiffNode, FsLoader, Workspace};

fn minimal(paths: serde_json::Value, schemas: serde_json::Value) -> serde_json::Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "t", "version": "1" },
        "paths": paths,
        "components": { "schemas": schemas }
    })
}

fn pets_path(schema_ref: &str) -> serde_json::Value {
    json!({
        "/pets": {
            "get": {
                "operationId": "listPets",
                "responses": {
                    "200": {
                        "description": "pets",
                        "content": {
                            "application/json": { "schema": { "$ref": schema_ref } }
                        }
                    }
                }
            }
        }
    })
}

#[tokio::test]
async fn transitive_load_resolves_cross_document_references() {
    let dir = tempfile::tempdir().unwrap();
    let path = |name: &str| dir.path().join(name).to_str().unwrap().to_string();

    let old = minimal(
        pets_path("#/components/schemas/Pet"),
        json!({ "Pet": { "type": "object", "properties": { "id": { "type": "integer" } } } }),
    );
    let new = minimal(pets_path("common.json#/components/schemas/Pet"), json!({}));
    let common = minimal(
        json!({}),
        json!({ "Pet": { "type": "object", "properties": { "id": { "type": "string" } } } }),
    );

    std::fs::write(path("old.json"), serde_json::to_vec(&old).unwrap()).unwrap();
    std::fs::write(path("new.json"), serde_json::to_vec(&new).unwrap()).unwrap();
    std::fs::write(path("common.json"), serde_json::to_vec(&common).unwrap()).unwrap();

    let loader = FsLoader;
    let mut workspace = Workspace::new();
    workspace
        .load_transitive(&loader, &path("old.json"))
        .await
        .unwrap();
    workspace
        .load_transitive(&loader, &path("new.json"))
        .await
        .unwrap();

    // The external target was discovered and loaded.
    assert!(workspace.contains(&path("common.json")));

    let diff = compare_locations(&workspace, &path("old.json"), &path("new.json")).unwrap();
    assert!(diff.is_incompatible(), "{diff:#?}");

    let op = &diff.changed_operations[0];
    let schema = op
        .responses
        .as_ref()
        .unwrap()
        .changed
        .get("200")
        .unwrap()
        .content
        .as_ref()
        .unwrap()
        .changed
        .get("application/json")
        .unwrap()
        .schema
        .as_ref()
        .unwrap();
    let id = schema.changed_properties.get("id").unwrap();
    let change = id.type_changed.as_ref().unwrap();
    assert_eq!(change.old, "integer");
    assert_eq!(change.new, "string");
}

#[tokio::test]
async fn mutually_referencing_documents_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let path = |name: &str| dir.path().join(name).to_str().unwrap().to_string();

    let a = minimal(
        json!({}),
        json!({ "A": { "$ref": "b.json#/components/schemas/B" } }),
    );
    let b = minimal(
        json!({}),
        json!({ "B": { "$ref": "a.json#/components/schemas/A" } }),
    );

    std::fs::write(path("a.json"), serde_json::to_vec(&a).unwrap()).unwrap();
    std::fs::write(path("b.json"), serde_json::to_vec(&b).unwrap()).unwrap();

    let loader = FsLoader;
    let mut workspace = Workspace::new();
    workspace
        .load_transitive(&loader, &path("a.json"))
        .await
        .unwrap();

    assert!(workspace.contains(&path("a.json")));
    assert!(workspace.contains(&path("b.json")));
}

#[test]
fn repeat_resolution_returns_the_same_instance() {
    let mut workspace = Workspace::new();
    workspace
        .register_document(
            "api.json",
            minimal(
                json!({}),
                json!({ "Pet": { "type": "object", "properties": { "id": { "type": "integer" } } } }),
            ),
        )
        .unwrap();

    let first: Arc<openapiv3::Schema> = workspace
        .resolve_text("api.json", "#/components/schemas/Pet")
        .unwrap();
    let second: Arc<openapiv3::Schema> = workspace
        .resolve_text("api.json", "#/components/schemas/Pet")
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
