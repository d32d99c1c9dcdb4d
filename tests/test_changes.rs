// Copyright 2025 Oxide Computer Company

use serde_json::{json, Value};
use skew::{
    compare, ChangedOpenApi, ChangedOperation, ChangedRequestBody, ChangedSchema, DiffError,
    DiffNode,
};

/// A small but representative document: plain and composed schemas,
/// read-only/write-only properties, a self-referential schema, parameters,
/// request bodies, and responses.
fn petstore() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "petstore", "version": "1.0.0" },
        "paths": {
            "/pets": {
                "get": {
                    "operationId": "listPets",
                    "parameters": [
                        {
                            "name": "limit",
                            "in": "query",
                            "schema": { "type": "integer", "format": "int32" }
                        }
                    ],
                    "responses": {
                        "200": {
                            "description": "pets",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Pets" }
                                }
                            }
                        }
                    }
                },
                "post": {
                    "operationId": "createPet",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/Pet" }
                            }
                        }
                    },
                    "responses": {
                        "201": {
                            "description": "created",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Pet" }
                                }
                            }
                        }
                    }
                }
            },
            "/pets/{petId}": {
                "get": {
                    "operationId": "getPet",
                    "parameters": [
                        {
                            "name": "petId",
                            "in": "path",
                            "required": true,
                            "schema": { "type": "string" }
                        }
                    ],
                    "responses": {
                        "200": {
                            "description": "a pet",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Pet" }
                                }
                            }
                        }
                    }
                }
            },
            "/nodes": {
                "get": {
                    "operationId": "getTree",
                    "responses": {
                        "200": {
                            "description": "tree",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Node" }
                                }
                            }
                        }
                    }
                }
            },
            "/creatures": {
                "get": {
                    "operationId": "listCreatures",
                    "responses": {
                        "200": {
                            "description": "creatures",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Creature" }
                                }
                            }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["id", "name"],
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "name": { "type": "string" },
                        "tag": { "type": "string" },
                        "status": {
                            "type": "string",
                            "enum": ["available", "pending", "sold"]
                        },
                        "secret": { "type": "string", "writeOnly": true },
                        "createdAt": {
                            "type": "string",
                            "format": "date-time",
                            "readOnly": true
                        }
                    }
                },
                "Pets": {
                    "type": "array",
                    "items": { "$ref": "#/components/schemas/Pet" }
                },
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "string" },
                        "children": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/Node" }
                        }
                    }
                },
                "Cat": {
                    "type": "object",
                    "required": ["petType"],
                    "properties": {
                        "petType": { "type": "string" },
                        "meows": { "type": "boolean" }
                    }
                },
                "Dog": {
                    "type": "object",
                    "required": ["petType"],
                    "properties": {
                        "petType": { "type": "string" },
                        "barks": { "type": "boolean" }
                    }
                },
                "Bird": {
                    "type": "object",
                    "required": ["petType"],
                    "properties": {
                        "petType": { "type": "string" },
                        "sings": { "type": "boolean" }
                    }
                },
                "Creature": {
                    "oneOf": [
                        { "$ref": "#/components/schemas/Cat" },
                        { "$ref": "#/components/schemas/Dog" }
                    ],
                    "discriminator": {
                        "propertyName": "petType",
                        "mapping": {
                            "cat": "#/components/schemas/Cat",
                            "dog": "#/components/schemas/Dog"
                        }
                    }
                }
            }
        }
    })
}

fn patched(base: &Value, ops: Value) -> Value {
    let mut doc = base.clone();
    let ops: Vec<json_patch::PatchOperation> = serde_json::from_value(ops).unwrap();
    json_patch::patch(&mut doc, &ops).unwrap();
    doc
}

/// Compare the base document against a patched copy. The patched document is
/// first compared against itself, which must always come out unchanged.
fn diff(ops: Value) -> ChangedOpenApi {
    let base = petstore();
    let new = patched(&base, ops);

    let self_diff = compare(&new, &new).expect("self comparison should not fail");
    assert!(
        self_diff.is_unchanged(),
        "document must compare unchanged against itself: {self_diff:#?}"
    );

    compare(&base, &new).expect("comparison should not fail")
}

fn operation<'a>(diff: &'a ChangedOpenApi, method: &str, path: &str) -> &'a ChangedOperation {
    diff.changed_operations
        .iter()
        .find(|op| op.method == method && op.path == path)
        .unwrap_or_else(|| panic!("no changed operation {method} {path} in {diff:#?}"))
}

fn response_schema<'a>(op: &'a ChangedOperation, status: &str) -> &'a ChangedSchema {
    op.responses
        .as_ref()
        .expect("responses should differ")
        .changed
        .get(status)
        .expect("status should differ")
        .content
        .as_ref()
        .expect("content should differ")
        .changed
        .get("application/json")
        .expect("media type should differ")
        .schema
        .as_ref()
        .expect("schema should differ")
}

fn request_schema(op: &ChangedOperation) -> &ChangedSchema {
    match op.request_body.as_ref().expect("request body should differ") {
        ChangedRequestBody::Changed(body) => body
            .content
            .as_ref()
            .expect("content should differ")
            .changed
            .get("application/json")
            .expect("media type should differ")
            .schema
            .as_ref()
            .expect("schema should differ"),
        other => panic!("expected a changed body, got {other:?}"),
    }
}

#[test]
fn identical_documents_are_equivalent() {
    let base = petstore();
    let result = compare(&base, &base).expect("comparison should not fail");

    assert!(result.is_unchanged());
    assert!(result.changed_operations.is_empty());
    assert!(result.new_endpoints.is_empty());
    assert!(result.missing_endpoints.is_empty());
    assert!(result.diagnostics.is_empty());
}

#[test]
fn self_referential_schema_mutation_terminates() {
    // Node contains children: Node[]; comparison must terminate and report
    // exactly the added property.
    let result = diff(json!([
        {
            "op": "add",
            "path": "/components/schemas/Node/properties/label",
            "value": { "type": "string" }
        }
    ]));

    let op = operation(&result, "get", "/nodes");
    let schema = response_schema(op, "200");
    assert_eq!(
        schema.increased_properties.keys().collect::<Vec<_>>(),
        vec!["label"]
    );
    assert!(schema.changed_properties.is_empty());
    assert!(result.is_compatible());
}

#[test]
fn required_set_difference() {
    let result = diff(json!([
        {
            "op": "replace",
            "path": "/components/schemas/Pet/required",
            "value": ["id", "tag"]
        }
    ]));

    let op = operation(&result, "post", "/pets");
    let schema = request_schema(op);
    assert_eq!(schema.required.increased, vec!["tag".to_string()]);
    assert_eq!(schema.required.missing, vec!["name".to_string()]);
    // "id" stayed required and goes unmentioned.
    assert!(!schema.required.increased.contains(&"id".to_string()));
    assert!(!schema.required.missing.contains(&"id".to_string()));

    // Newly-required in a request breaks old clients.
    assert!(result.is_incompatible());
}

#[test]
fn write_only_property_removal_is_invisible_in_responses() {
    let result = diff(json!([
        { "op": "remove", "path": "/components/schemas/Pet/properties/secret" }
    ]));

    // Every operation that sees Pet only in responses must stay unchanged;
    // the request side must report the removal.
    assert_eq!(result.changed_operations.len(), 1, "{result:#?}");
    let op = operation(&result, "post", "/pets");
    assert!(op.responses.is_none());

    let schema = request_schema(op);
    assert_eq!(
        schema.missing_properties.keys().collect::<Vec<_>>(),
        vec!["secret"]
    );
    assert!(result.is_incompatible());
}

#[test]
fn read_only_property_removal_is_invisible_in_requests() {
    let result = diff(json!([
        { "op": "remove", "path": "/components/schemas/Pet/properties/createdAt" }
    ]));

    // The request side of POST /pets must not mention the property.
    let op = operation(&result, "post", "/pets");
    assert!(op.request_body.is_none());

    // The response side must.
    let get = operation(&result, "get", "/pets/{petId}");
    let schema = response_schema(get, "200");
    assert_eq!(
        schema.missing_properties.keys().collect::<Vec<_>>(),
        vec!["createdAt"]
    );
    assert!(result.is_incompatible());
}

#[test]
fn enum_widening_is_compatible() {
    let result = diff(json!([
        {
            "op": "add",
            "path": "/components/schemas/Pet/properties/status/enum/-",
            "value": "adopted"
        }
    ]));

    let op = operation(&result, "get", "/pets/{petId}");
    let status = response_schema(op, "200")
        .changed_properties
        .get("status")
        .expect("status property should differ");
    assert_eq!(status.enumeration.increased, vec!["adopted".to_string()]);
    assert!(status.enumeration.missing.is_empty());

    assert!(!result.is_unchanged());
    assert!(result.is_compatible());
}

#[test]
fn enum_narrowing_is_incompatible() {
    let result = diff(json!([
        { "op": "remove", "path": "/components/schemas/Pet/properties/status/enum/2" }
    ]));

    let op = operation(&result, "get", "/pets/{petId}");
    let status = response_schema(op, "200")
        .changed_properties
        .get("status")
        .expect("status property should differ");
    assert_eq!(status.enumeration.missing, vec!["sold".to_string()]);
    assert!(result.is_incompatible());
}

#[test]
fn adding_an_optional_property_is_compatible() {
    let result = diff(json!([
        {
            "op": "add",
            "path": "/components/schemas/Pet/properties/color",
            "value": { "type": "string" }
        }
    ]));

    assert!(!result.is_unchanged());
    assert!(result.is_compatible());
}

#[test]
fn property_type_change_is_incompatible() {
    let result = diff(json!([
        {
            "op": "replace",
            "path": "/components/schemas/Pet/properties/name/type",
            "value": "integer"
        }
    ]));

    let op = operation(&result, "post", "/pets");
    let name = request_schema(op)
        .changed_properties
        .get("name")
        .expect("name property should differ");
    let change = name.type_changed.as_ref().expect("type should change");
    assert_eq!(change.old, "string");
    assert_eq!(change.new, "integer");
    assert!(result.is_incompatible());
}

#[test]
fn max_length_narrowing_is_incompatible() {
    let result = diff(json!([
        {
            "op": "add",
            "path": "/components/schemas/Pet/properties/name/maxLength",
            "value": 10
        }
    ]));

    let op = operation(&result, "post", "/pets");
    let name = request_schema(op)
        .changed_properties
        .get("name")
        .expect("name property should differ");
    let change = name.max_length.as_ref().expect("maxLength should change");
    assert_eq!(change.old, None);
    assert_eq!(change.new, Some(10));
    assert!(result.is_incompatible());
}

#[test]
fn removing_a_parameter_is_incompatible() {
    let result = diff(json!([
        { "op": "remove", "path": "/paths/~1pets/get/parameters/0" }
    ]));

    let op = operation(&result, "get", "/pets");
    let parameters = op.parameters.as_ref().expect("parameters should differ");
    assert_eq!(parameters.missing.len(), 1);
    assert!(result.is_incompatible());
}

#[test]
fn adding_a_required_parameter_is_incompatible() {
    let result = diff(json!([
        {
            "op": "add",
            "path": "/paths/~1pets/get/parameters/-",
            "value": {
                "name": "filter",
                "in": "query",
                "required": true,
                "schema": { "type": "string" }
            }
        }
    ]));

    assert!(result.is_incompatible());
}

#[test]
fn adding_an_optional_parameter_is_compatible() {
    let result = diff(json!([
        {
            "op": "add",
            "path": "/paths/~1pets/get/parameters/-",
            "value": {
                "name": "filter",
                "in": "query",
                "schema": { "type": "string" }
            }
        }
    ]));

    assert!(!result.is_unchanged());
    assert!(result.is_compatible());
}

#[test]
fn parameter_becoming_required_is_incompatible() {
    let result = diff(json!([
        { "op": "add", "path": "/paths/~1pets/get/parameters/0/required", "value": true }
    ]));

    let op = operation(&result, "get", "/pets");
    let parameters = op.parameters.as_ref().expect("parameters should differ");
    let limit = &parameters.changed[0];
    let required = limit.required.as_ref().expect("required should change");
    assert!(!required.old && required.new);
    assert!(result.is_incompatible());
}

#[test]
fn removing_the_request_body_is_incompatible() {
    let result = diff(json!([
        { "op": "remove", "path": "/paths/~1pets/post/requestBody" }
    ]));

    let op = operation(&result, "post", "/pets");
    assert!(matches!(
        op.request_body,
        Some(ChangedRequestBody::Removed { required: true })
    ));
    assert!(result.is_incompatible());
}

#[test]
fn discriminator_mapping_diff() {
    let result = diff(json!([
        {
            "op": "replace",
            "path": "/components/schemas/Creature/oneOf/1/$ref",
            "value": "#/components/schemas/Bird"
        },
        { "op": "remove", "path": "/components/schemas/Creature/discriminator/mapping/dog" },
        {
            "op": "add",
            "path": "/components/schemas/Creature/discriminator/mapping/bird",
            "value": "#/components/schemas/Bird"
        }
    ]));

    let op = operation(&result, "get", "/creatures");
    let schema = response_schema(op, "200");
    let one_of = schema.one_of.as_ref().expect("oneOf should differ");
    assert_eq!(one_of.increased, vec!["bird".to_string()]);
    assert_eq!(one_of.missing, vec!["dog".to_string()]);
    // Cat is shared and unchanged: no "changed" entries.
    assert!(one_of.changed.is_empty());
}

#[test]
fn discriminator_property_rename_is_incompatible() {
    let result = diff(json!([
        {
            "op": "replace",
            "path": "/components/schemas/Creature/discriminator/propertyName",
            "value": "kind"
        }
    ]));

    let op = operation(&result, "get", "/creatures");
    let schema = response_schema(op, "200");
    assert!(schema.discriminator_changed);
    assert!(result.is_incompatible());
}

#[test]
fn missing_discriminator_is_a_hard_error() {
    let base = petstore();
    let new = patched(
        &base,
        json!([
            { "op": "remove", "path": "/components/schemas/Creature/discriminator" }
        ]),
    );

    let err = compare(&base, &new).expect_err("comparison should fail");
    assert!(matches!(err, DiffError::MalformedDiscriminator { .. }), "{err}");
}

#[test]
fn ambiguous_path_templates_fail_fast() {
    let doc = json!({
        "openapi": "3.0.3",
        "info": { "title": "t", "version": "1" },
        "paths": {
            "/a/{x}": {
                "get": { "responses": { "200": { "description": "ok" } } }
            },
            "/a/{y}": {
                "get": { "responses": { "200": { "description": "ok" } } }
            }
        }
    });

    let err = compare(&doc, &doc).expect_err("ambiguous templates should fail");
    assert!(matches!(err, DiffError::AmbiguousPath { .. }), "{err}");
}

#[test]
fn removed_operation_is_a_missing_endpoint() {
    let result = diff(json!([
        { "op": "remove", "path": "/paths/~1nodes" }
    ]));

    assert_eq!(result.missing_endpoints.len(), 1);
    assert_eq!(result.missing_endpoints[0].path, "/nodes");
    assert_eq!(
        result.missing_endpoints[0].operation_id.as_deref(),
        Some("getTree")
    );
    assert!(result.is_incompatible());
}

#[test]
fn renamed_path_parameter_is_the_same_operation() {
    // /pets/{petId} and /pets/{id} normalize to the same route; the rename
    // alone is no difference at all.
    let base = petstore();
    let mut renamed = base.clone();
    let paths = renamed.get_mut("paths").unwrap().as_object_mut().unwrap();
    let item = paths.remove("/pets/{petId}").unwrap();
    let item_text = serde_json::to_string(&item).unwrap().replace("petId", "id");
    paths.insert("/pets/{id}".to_string(), serde_json::from_str(&item_text).unwrap());

    let result = compare(&base, &renamed).expect("comparison should not fail");
    assert!(result.missing_endpoints.is_empty());
    assert!(result.new_endpoints.is_empty());
    assert!(result.is_unchanged(), "{result:#?}");
}

#[test]
fn operation_deprecation_is_compatible() {
    let result = diff(json!([
        { "op": "add", "path": "/paths/~1pets/get/deprecated", "value": true }
    ]));

    let op = operation(&result, "get", "/pets");
    assert!(op.deprecated);
    assert!(result.is_compatible());
}

#[test]
fn new_security_requirement_is_incompatible() {
    let result = diff(json!([
        {
            "op": "add",
            "path": "/paths/~1pets/get/security",
            "value": [ { "api_key": [] } ]
        }
    ]));

    let op = operation(&result, "get", "/pets");
    let security = op.security.as_ref().expect("security should differ");
    assert_eq!(security.increased.len(), 1);
    assert!(result.is_incompatible());
}

#[test]
fn dangling_reference_is_a_diagnostic_not_a_failure() {
    let result = diff(json!([
        {
            "op": "replace",
            "path": "/paths/~1nodes/get/responses/200/content/application~1json/schema/$ref",
            "value": "#/components/schemas/Ghost"
        }
    ]));

    assert!(!result.diagnostics.is_empty(), "{result:#?}");
}
