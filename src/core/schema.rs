//! JSON Schema (draft-07) validation for project description files.
//!
//! The teacher validates its TOML manifests structurally through serde
//! alone. That is not enough here: §4.1 requires draft-07 semantics
//! (`$ref`, `oneOf`, `allOf`, conditional `if`/`then`) to reject a
//! project description *before* it is deserialized into typed structs,
//! with an error that can point at the exact offending byte span. The
//! `jsonschema` crate is the one new dependency this repo adds over the
//! teacher's stack for exactly that reason (see DESIGN.md).

use jsonschema::JSONSchema;
use miette::{NamedSource, SourceSpan};
use serde_json::Value;
use std::sync::LazyLock;

use crate::core::error::BuildError;

/// The embedded project-description schema, compiled once per process.
static SCHEMA: LazyLock<JSONSchema> = LazyLock::new(|| {
    let doc: Value = serde_json::from_str(SCHEMA_TEXT).expect("embedded schema is valid JSON");
    JSONSchema::options()
        .with_draft(jsonschema::Draft::Draft7)
        .compile(&doc)
        .expect("embedded schema compiles")
});

const SCHEMA_TEXT: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "project-description",
  "type": "object",
  "required": ["version", "workspace", "targets"],
  "properties": {
    "$schema": { "const": "http://json-schema.org/draft-07/schema" },
    "workspace": { "type": "string", "pattern": "^[\\w\\-+ ]+$" },
    "version": { "type": "string", "pattern": "^[\\w\\-+.]+$" },
    "workingDir": { "type": "string" },
    "configurations": {
      "type": "array",
      "items": { "type": "string" },
      "minItems": 1
    },
    "externalDependencies": {
      "type": "object",
      "additionalProperties": true
    },
    "distributionItems": {
      "type": "array",
      "items": { "type": "object" }
    },
    "targets": {
      "type": "object",
      "minProperties": 1,
      "patternProperties": {
        "^[\\w\\-+.]{3,}$": { "$ref": "#/definitions/target" }
      },
      "additionalProperties": false
    }
  },
  "definitions": {
    "target": {
      "type": "object",
      "required": ["type"],
      "properties": {
        "type": {
          "type": "string",
          "enum": ["source", "cmake", "subProject", "script", "process"]
        },
        "links": {
          "type": "array",
          "items": { "type": "string", "pattern": "^[\\w\\-+.]+$" }
        },
        "projectStaticLinks": {
          "type": "array",
          "items": { "type": "string", "pattern": "^[\\w\\-+.]+$" }
        }
      },
      "allOf": [
        {
          "if": { "properties": { "type": { "const": "source" } } },
          "then": {
            "required": ["kind"],
            "properties": {
              "kind": {
                "type": "string",
                "enum": [
                  "staticLibrary",
                  "sharedLibrary",
                  "consoleApplication",
                  "desktopApplication"
                ]
              },
              "language": { "type": "string", "enum": ["c", "cpp"] }
            }
          }
        },
        {
          "if": { "properties": { "type": { "const": "cmake" } } },
          "then": { "required": ["location"] }
        },
        {
          "if": { "properties": { "type": { "const": "subProject" } } },
          "then": { "required": ["location"] }
        },
        {
          "if": { "properties": { "type": { "const": "script" } } },
          "then": { "required": ["path"] }
        },
        {
          "if": { "properties": { "type": { "const": "process" } } },
          "then": { "required": ["path"] }
        }
      ]
    }
  }
}"#;

/// The embedded schema's own source text, for callers that fold it into
/// an "extra hash" input (§4.6: any schema change invalidates every
/// cache entry) rather than validating against it.
pub fn schema_text() -> &'static str {
    SCHEMA_TEXT
}

/// Validate `value` (the parsed, comment-stripped project description)
/// against the embedded schema. `source_text` and `path` are used only
/// to anchor the resulting diagnostic's source span; validation itself
/// operates on the already-parsed value.
pub fn validate(value: &Value, source_text: &str, path: &str) -> Result<(), BuildError> {
    let result = SCHEMA.validate(value);
    if let Err(mut errors) = result {
        let first = errors.next().expect("validate() Err always has >=1 error");
        let message = first.to_string();
        let span = span_for_instance_path(source_text, &first.instance_path.to_string());
        return Err(BuildError::SchemaValidation {
            path: path.to_string(),
            src: Some(NamedSource::new(path, source_text.to_string())),
            span,
            message,
        });
    }
    Ok(())
}

/// Best-effort mapping from a JSON Pointer instance path to a byte span
/// in the original source text, for diagnostic rendering. Falls back to
/// pointing at the start of the file when the property can't be found
/// textually (e.g. it's simply absent, as with a `required` violation).
fn span_for_instance_path(source_text: &str, instance_path: &str) -> Option<SourceSpan> {
    let last_segment = instance_path.rsplit('/').next()?;
    if last_segment.is_empty() {
        return None;
    }
    let needle = format!("\"{}\"", last_segment);
    source_text
        .find(&needle)
        .map(|offset| SourceSpan::new(offset.into(), needle.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_valid_document() {
        let v = json!({
            "version": "1.0",
            "workspace": "demo",
            "targets": {
                "app": { "type": "source", "kind": "consoleApplication" }
            }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_ok());
    }

    #[test]
    fn rejects_missing_targets() {
        let v = json!({ "version": "1.0", "workspace": "demo" });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn rejects_missing_version() {
        let v = json!({
            "workspace": "demo",
            "targets": { "app": { "type": "source", "kind": "consoleApplication" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn rejects_missing_workspace() {
        let v = json!({
            "version": "1.0",
            "targets": { "app": { "type": "source", "kind": "consoleApplication" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn rejects_source_target_without_kind() {
        let v = json!({
            "version": "1.0",
            "workspace": "demo",
            "targets": { "app": { "type": "source" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn rejects_unknown_target_type() {
        let v = json!({
            "version": "1.0",
            "workspace": "demo",
            "targets": { "app": { "type": "bogus" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn rejects_wrong_schema_marker() {
        let v = json!({
            "$schema": "http://example.com/not-the-right-schema",
            "version": "1.0",
            "workspace": "demo",
            "targets": { "app": { "type": "source", "kind": "consoleApplication" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn accepts_matching_schema_marker() {
        let v = json!({
            "$schema": "http://json-schema.org/draft-07/schema",
            "version": "1.0",
            "workspace": "demo",
            "targets": { "app": { "type": "source", "kind": "consoleApplication" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_ok());
    }

    #[test]
    fn rejects_target_name_shorter_than_three_characters() {
        let v = json!({
            "version": "1.0",
            "workspace": "demo",
            "targets": { "ab": { "type": "source", "kind": "consoleApplication" } }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }

    #[test]
    fn rejects_link_name_with_disallowed_characters() {
        let v = json!({
            "version": "1.0",
            "workspace": "demo",
            "targets": {
                "app": {
                    "type": "source",
                    "kind": "consoleApplication",
                    "links": ["ok_name", "bad name!"]
                }
            }
        });
        assert!(validate(&v, &v.to_string(), "project.json").is_err());
    }
}
