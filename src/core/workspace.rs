//! The resolved `Workspace` (§3): a project description after JSON
//! parsing, schema validation, and dotted-key override resolution have
//! all run, holding typed targets instead of raw JSON.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::configuration::BuildConfiguration;
use crate::core::error::BuildError;
use crate::core::target::Target;
use crate::util::interning::InternedString;

/// One entry of a workspace's `distributionItems` list: a named bundle
/// of files assembled after a successful build. Out of scope to
/// *execute* here (post-build bundling is excluded), but the workspace
/// model still carries it since the project description names it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionItem {
    pub name: String,
    #[serde(flatten)]
    pub raw: BTreeMap<String, Value>,
}

/// A fully resolved workspace: everything a build needs to know about
/// the project, with no further JSON traversal required downstream.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub name: InternedString,
    pub version: Option<String>,
    pub working_dir: PathBuf,
    pub configurations: Vec<BuildConfiguration>,
    pub targets: Vec<Target>,
    pub distribution_items: Vec<DistributionItem>,
    pub external_dependencies: BTreeMap<String, Value>,
    /// Directory containing the project description file; `working_dir`
    /// is resolved relative to this.
    project_dir: PathBuf,
}

impl Workspace {
    /// Build a `Workspace` from its already-typed fields. Used by the
    /// project loader (`core::manifest`) once dotted overrides are
    /// resolved and each target is deserialized into its concrete kind.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        version: Option<String>,
        working_dir: PathBuf,
        configurations: Vec<BuildConfiguration>,
        targets: Vec<Target>,
        distribution_items: Vec<DistributionItem>,
        external_dependencies: BTreeMap<String, Value>,
        project_dir: PathBuf,
    ) -> Result<Self, BuildError> {
        if configurations.is_empty() {
            return Err(BuildError::SemanticValidation {
                message: "workspace must declare at least one configuration".to_string(),
            });
        }

        let mut seen_targets = std::collections::HashSet::new();
        for t in &targets {
            if !seen_targets.insert(t.name) {
                return Err(BuildError::SemanticValidation {
                    message: format!("duplicate target name `{}`", t.name),
                });
            }
        }

        let mut seen_items = std::collections::HashSet::new();
        for item in &distribution_items {
            if !seen_items.insert(item.name.clone()) {
                return Err(BuildError::SemanticValidation {
                    message: format!("duplicate distribution item name `{}`", item.name),
                });
            }
        }

        for t in &targets {
            if let Some(source) = t.as_source() {
                for dep in source.links.iter().chain(&source.project_static_links) {
                    if !seen_targets.contains(dep) {
                        return Err(BuildError::SemanticValidation {
                            message: format!(
                                "target `{}` links against unknown target `{}`",
                                t.name, dep
                            ),
                        });
                    }
                }
                if let Some(bad) = source
                    .compiler_flags
                    .iter()
                    .find(|flag| flag.starts_with("-W"))
                {
                    return Err(BuildError::SemanticValidation {
                        message: format!(
                            "target `{}`: compile option `{bad}` belongs in `warnings`, not `compilerFlags`",
                            t.name
                        ),
                    });
                }
            }
        }

        Ok(Workspace {
            name: InternedString::new(name),
            version,
            working_dir,
            configurations,
            targets,
            distribution_items,
            external_dependencies,
            project_dir,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn resolved_working_dir(&self) -> PathBuf {
        if self.working_dir.is_absolute() {
            self.working_dir.clone()
        } else {
            self.project_dir.join(&self.working_dir)
        }
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name.as_str() == name)
    }

    pub fn configuration(&self, name: &str) -> Option<&BuildConfiguration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    /// Build order for native-link-dependent targets: a topological sort
    /// over `links`/`projectStaticLinks` edges between `source` targets,
    /// stable by declaration order among independent targets.
    ///
    /// A cycle reached through a `links` edge is always fatal — dynamic
    /// and executable linking has no notion of a link group. A cycle
    /// reached only through `projectStaticLinks` edges is permitted (the
    /// command synthesizer wraps such siblings in a linker group
    /// instead of ordering them); those edges are simply skipped once
    /// they'd close a cycle, leaving the rest of the order intact.
    ///
    /// `configuration`/`platform` gate which targets participate at all
    /// (§3's `onlyIn*`/`notIn*` filters): a target excluded for this pair
    /// is dropped from the order entirely, and dependency edges pointing
    /// at an excluded target are skipped rather than followed.
    pub fn topological_target_order(
        &self,
        configuration: &str,
        platform: &str,
    ) -> Result<Vec<InternedString>, BuildError> {
        let mut order = Vec::new();
        let mut visiting = std::collections::HashSet::new();
        let mut visited = std::collections::HashSet::new();

        fn visit(
            ws: &Workspace,
            name: InternedString,
            configuration: &str,
            platform: &str,
            visiting: &mut std::collections::HashSet<InternedString>,
            visited: &mut std::collections::HashSet<InternedString>,
            order: &mut Vec<InternedString>,
        ) -> Result<(), BuildError> {
            if visited.contains(&name) {
                return Ok(());
            }
            if !visiting.insert(name) {
                return Err(BuildError::SemanticValidation {
                    message: format!("dependency cycle detected at target `{}`", name),
                });
            }
            if let Some(target) = ws.target(name.as_str()) {
                if let Some(source) = target.as_source() {
                    for dep in &source.links {
                        if let Some(dep_target) = ws.target(dep.as_str()) {
                            if dep_target.matches_conditions(configuration, platform) {
                                visit(ws, *dep, configuration, platform, visiting, visited, order)?;
                            }
                        }
                    }
                    for dep in &source.project_static_links {
                        if let Some(dep_target) = ws.target(dep.as_str()) {
                            if dep_target.matches_conditions(configuration, platform)
                                && !visiting.contains(dep)
                            {
                                visit(ws, *dep, configuration, platform, visiting, visited, order)?;
                            }
                        }
                    }
                }
            }
            visiting.remove(&name);
            visited.insert(name);
            order.push(name);
            Ok(())
        }

        for t in &self.targets {
            if t.matches_conditions(configuration, platform) {
                visit(self, t.name, configuration, platform, &mut visiting, &mut visited, &mut order)?;
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{SourceTarget, TargetDefinition, TargetKind};

    fn source_target(name: &str, links: &[&str]) -> Target {
        source_target_with_static_links(name, links, &[])
    }

    fn source_target_with_static_links(
        name: &str,
        links: &[&str],
        project_static_links: &[&str],
    ) -> Target {
        Target {
            name: InternedString::new(name),
            definition: TargetDefinition::Source(SourceTarget {
                kind: TargetKind::StaticLibrary,
                language: Default::default(),
                files: vec![],
                exclude: vec![],
                include_dirs: vec![],
                defines: vec![],
                compiler_flags: vec![],
                linker_flags: vec![],
                libraries: vec![],
                links: links.iter().map(|s| InternedString::new(s)).collect(),
                project_static_links: project_static_links
                    .iter()
                    .map(|s| InternedString::new(s))
                    .collect(),
                precompiled_header: None,
                cpp_standard: None,
                warning_preset: Default::default(),
                thread_model: Default::default(),
                msvc_runtime: None,
                cpp_runtime: None,
                position_independent_code: None,
                run_configuration: None,
                conditions: Default::default(),
            }),
        }
    }

    #[test]
    fn rejects_empty_configurations() {
        let result = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![],
            vec![],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_target_names() {
        let result = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![source_target("app", &[]), source_target("app", &[])],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_link_to_unknown_target() {
        let result = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![source_target("app", &["missing"])],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        );
        assert!(matches!(result, Err(BuildError::SemanticValidation { .. })));
    }

    #[test]
    fn rejects_warning_flag_in_compiler_flags() {
        let mut app = source_target("app", &[]);
        if let TargetDefinition::Source(s) = &mut app.definition {
            s.compiler_flags.push("-Wall".to_string());
        }
        let result = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![app],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        );
        assert!(matches!(result, Err(BuildError::SemanticValidation { .. })));
    }

    #[test]
    fn topological_order_respects_links() {
        let ws = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![source_target("app", &["lib"]), source_target("lib", &[])],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        )
        .unwrap();

        let order = ws.topological_target_order("Debug", "linux").unwrap();
        let lib_pos = order.iter().position(|n| n.as_str() == "lib").unwrap();
        let app_pos = order.iter().position(|n| n.as_str() == "app").unwrap();
        assert!(lib_pos < app_pos);
    }

    #[test]
    fn detects_dependency_cycle() {
        let ws = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![source_target("a", &["b"]), source_target("b", &["a"])],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        )
        .unwrap();

        assert!(ws.topological_target_order("Debug", "linux").is_err());
    }

    #[test]
    fn tolerates_cycle_formed_only_by_static_links() {
        let ws = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![
                source_target_with_static_links("a", &[], &["b"]),
                source_target_with_static_links("b", &[], &["a"]),
            ],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        )
        .unwrap();

        let order = ws.topological_target_order("Debug", "linux").unwrap();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn excludes_targets_whose_conditions_do_not_match() {
        use crate::core::target::{ConditionValue, TargetConditions};

        let mut windows_only = source_target("win-only", &[]);
        if let TargetDefinition::Source(s) = &mut windows_only.definition {
            s.conditions = TargetConditions {
                only_in_platform: Some(ConditionValue::Single("windows".to_string())),
                ..Default::default()
            };
        }

        let ws = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![source_target("app", &[]), windows_only],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp"),
        )
        .unwrap();

        let order = ws.topological_target_order("Debug", "linux").unwrap();
        assert_eq!(order, vec![InternedString::new("app")]);

        let order = ws.topological_target_order("Debug", "windows").unwrap();
        assert_eq!(order.len(), 2);
    }
}
