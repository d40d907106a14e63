//! Project description loading (§4.1): comment stripping, JSON parsing,
//! schema validation, dotted-key override resolution, and typed
//! deserialization into a [`Workspace`].

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::core::configuration::BuildConfiguration;
use crate::core::error::BuildError;
use crate::core::overrides;
use crate::core::schema;
use crate::core::target::{Target, TargetDefinition};
use crate::core::workspace::{DistributionItem, Workspace};
use crate::util::interning::InternedString;

/// Load and fully resolve a project description file for one
/// `(configuration, platform)` pair.
///
/// Every object in the document — the workspace's own top-level
/// properties and each target's properties — goes through dotted-key
/// override resolution independently, since overrides are a per-object
/// grammar (§6), not a whole-document transform.
pub fn load(path: &Path, configuration: &str, platform: &str) -> Result<Workspace, BuildError> {
    let raw = std::fs::read_to_string(path).map_err(|e| BuildError::SemanticValidation {
        message: format!("failed to read `{}`: {e}", path.display()),
    })?;
    parse(&raw, path, configuration, platform)
}

/// Parse already-read project description text. Split out from [`load`]
/// so tests can exercise parsing without touching the filesystem.
pub fn parse(
    raw: &str,
    path: &Path,
    configuration: &str,
    platform: &str,
) -> Result<Workspace, BuildError> {
    let stripped = crate::util::json_comments::strip_comments(raw);
    let path_str = path.display().to_string();

    let value: Value =
        serde_json::from_str(&stripped).map_err(|e| BuildError::SchemaValidation {
            path: path_str.clone(),
            src: Some(miette::NamedSource::new(&path_str, stripped.clone())),
            span: None,
            message: format!("invalid JSON: {e}"),
        })?;

    schema::validate(&value, &stripped, &path_str)?;

    let top = value.as_object().ok_or_else(|| BuildError::SemanticValidation {
        message: "project description must be a JSON object".to_string(),
    })?;

    let resolved_top = overrides::resolve(top, configuration, platform);

    let name = resolved_top
        .get("workspace")
        .and_then(Value::as_str)
        .ok_or_else(|| BuildError::SemanticValidation {
            message: "project description is missing required `workspace`".to_string(),
        })?
        .to_string();

    let version = resolved_top
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| BuildError::SemanticValidation {
            message: "project description is missing required `version`".to_string(),
        })?
        .to_string();

    let working_dir = resolved_top
        .get("workingDir")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let configurations = match resolved_top.get("configurations") {
        Some(Value::Array(items)) => items.iter().map(parse_configuration).collect(),
        _ => vec![BuildConfiguration::named("Debug"), BuildConfiguration::named("Release")],
    };

    let external_dependencies = match resolved_top.get("externalDependencies") {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        _ => Default::default(),
    };

    let distribution_items = match resolved_top.get("distributionItems") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| parse_distribution_item(item, configuration, platform))
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };

    let targets_obj = resolved_top
        .get("targets")
        .and_then(Value::as_object)
        .ok_or_else(|| BuildError::SemanticValidation {
            message: "project description is missing required `targets`".to_string(),
        })?;

    let mut targets = Vec::with_capacity(targets_obj.len());
    for (target_name, target_value) in targets_obj {
        let target_obj = target_value
            .as_object()
            .ok_or_else(|| BuildError::SemanticValidation {
                message: format!("target `{target_name}` must be a JSON object"),
            })?;
        let resolved_target = overrides::resolve(target_obj, configuration, platform);
        let definition: TargetDefinition = serde_json::from_value(Value::Object(resolved_target))
            .map_err(|e| BuildError::SemanticValidation {
                message: format!("target `{target_name}`: {e}"),
            })?;
        targets.push(Target {
            name: InternedString::new(target_name),
            definition,
        });
    }

    let project_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Workspace::new(
        &name,
        Some(version),
        working_dir,
        configurations,
        targets,
        distribution_items,
        external_dependencies,
        project_dir,
    )
}

/// A configuration list entry is either a bare preset name (`"Release"`)
/// or an object overriding fields on top of a named preset (or a wholly
/// custom configuration with its own name and no preset defaults).
fn parse_configuration(value: &Value) -> BuildConfiguration {
    match value {
        Value::String(name) => BuildConfiguration::named(name),
        Value::Object(map) => {
            let name = map.get("name").and_then(Value::as_str).unwrap_or("Custom");
            let base = BuildConfiguration::named(name);
            let mut merged = serde_json::to_value(&base).unwrap_or(Value::Null);
            if let (Value::Object(merged_map), Value::Object(overrides)) = (&mut merged, map) {
                for (key, value) in overrides {
                    merged_map.insert(key.clone(), value.clone());
                }
            }
            serde_json::from_value(merged).unwrap_or(base)
        }
        _ => BuildConfiguration::named("Debug"),
    }
}

fn parse_distribution_item(
    value: &Value,
    configuration: &str,
    platform: &str,
) -> Result<DistributionItem, BuildError> {
    let obj = value
        .as_object()
        .ok_or_else(|| BuildError::SemanticValidation {
            message: "distribution item must be a JSON object".to_string(),
        })?;
    let resolved = overrides::resolve(obj, configuration, platform);
    let name = resolved
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| BuildError::SemanticValidation {
            message: "distribution item is missing required `name`".to_string(),
        })?
        .to_string();
    let mut raw: std::collections::BTreeMap<String, Value> = resolved.clone().into_iter().collect();
    raw.remove("name");
    Ok(DistributionItem { name, raw })
}

/// Enumerate the `(configuration, platform)` pairs a project description
/// is resolved for, given the project's `configurations` list and a
/// fixed platform identifier. A thin helper so callers of `load` don't
/// re-derive this from a raw `Value`.
pub fn configuration_names(top: &Map<String, Value>) -> Vec<String> {
    match top.get("configurations") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => vec!["Debug".to_string(), "Release".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_doc() -> &'static str {
        r#"{
            "version": "1.0",
            "workspace": "demo",
            "configurations": ["Debug", "Release"],
            "targets": {
                "app": {
                    "type": "source",
                    "kind": "consoleApplication",
                    "files": ["src/main.c"],
                    "defines": ["BASE=1"],
                    "defines:release": ["BASE=2"]
                }
            }
        }"#
    }

    #[test]
    fn parses_minimal_project_description() {
        let ws = parse(minimal_doc(), Path::new("project.json"), "Debug", "linux").unwrap();
        assert_eq!(ws.name.as_str(), "demo");
        assert_eq!(ws.configurations.len(), 2);
        let app = ws.target("app").unwrap();
        let source = app.as_source().unwrap();
        assert_eq!(source.defines, vec!["BASE=1".to_string()]);
    }

    #[test]
    fn applies_configuration_override_to_target_property() {
        let ws = parse(minimal_doc(), Path::new("project.json"), "Release", "linux").unwrap();
        let app = ws.target("app").unwrap();
        let source = app.as_source().unwrap();
        assert_eq!(source.defines, vec!["BASE=2".to_string()]);
    }

    #[test]
    fn strips_comments_before_parsing() {
        let doc = r#"{
            // top-level comment
            "version": "1.0",
            "workspace": "demo",
            "configurations": ["Debug"],
            "targets": { "app": { "type": "source", "kind": "staticLibrary" } }
        }"#;
        let ws = parse(doc, Path::new("project.json"), "Debug", "linux").unwrap();
        assert_eq!(ws.name.as_str(), "demo");
    }

    #[test]
    fn rejects_document_failing_schema_validation() {
        let doc = r#"{ "version": "1.0", "workspace": "demo", "targets": { "app": { "type": "bogus" } } }"#;
        let result = parse(doc, Path::new("project.json"), "Debug", "linux");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_document_missing_required_version() {
        let doc = r#"{
            "workspace": "demo",
            "targets": { "app": { "type": "source", "kind": "staticLibrary" } }
        }"#;
        let result = parse(doc, Path::new("project.json"), "Debug", "linux");
        assert!(result.is_err());
    }

    #[test]
    fn missing_configurations_defaults_to_debug_release() {
        let doc = r#"{
            "version": "1.0",
            "workspace": "demo",
            "targets": { "app": { "type": "source", "kind": "staticLibrary" } }
        }"#;
        let ws = parse(doc, Path::new("project.json"), "Debug", "linux").unwrap();
        assert_eq!(ws.configurations.len(), 2);
    }
}
