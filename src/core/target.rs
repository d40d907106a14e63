//! The target tagged union (§3) and the small enums that hang off it:
//! source language, C++ standard, target kind, warning presets, thread
//! model, run configuration and per-platform overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::util::interning::InternedString;

/// Source language for a `source` target's compilation units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    #[serde(rename = "cpp")]
    Cxx,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "cpp",
        }
    }
}

/// C++ standard version, ordered so comparisons (`std >= Cpp17`) work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CppStandard {
    Cpp98,
    Cpp11,
    Cpp14,
    Cpp17,
    Cpp20,
    Cpp23,
}

impl CppStandard {
    /// The value after `-std=` for GCC/Clang (`c++17`, `gnu++20`, ...).
    pub fn gnu_flag_value(&self) -> &'static str {
        match self {
            CppStandard::Cpp98 => "c++98",
            CppStandard::Cpp11 => "c++11",
            CppStandard::Cpp14 => "c++14",
            CppStandard::Cpp17 => "c++17",
            CppStandard::Cpp20 => "c++20",
            CppStandard::Cpp23 => "c++23",
        }
    }

    /// The value after `/std:` for MSVC. MSVC has no dedicated flag for
    /// pre-14 standards; it falls back to the compiler's default.
    pub fn msvc_flag_value(&self) -> Option<&'static str> {
        match self {
            CppStandard::Cpp98 | CppStandard::Cpp11 => None,
            CppStandard::Cpp14 => Some("c++14"),
            CppStandard::Cpp17 => Some("c++17"),
            CppStandard::Cpp20 => Some("c++20"),
            CppStandard::Cpp23 => Some("c++latest"),
        }
    }
}

/// MSVC CRT linkage (`/MD`, `/MT`, and their debug variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MsvcRuntime {
    Dynamic,
    DynamicDebug,
    Static,
    StaticDebug,
}

impl MsvcRuntime {
    /// Pick the debug/release variant of `self` based on `is_debug`,
    /// preserving whether it's static or dynamic.
    pub fn for_debug(self, is_debug: bool) -> MsvcRuntime {
        match (self, is_debug) {
            (MsvcRuntime::Dynamic | MsvcRuntime::DynamicDebug, true) => MsvcRuntime::DynamicDebug,
            (MsvcRuntime::Dynamic | MsvcRuntime::DynamicDebug, false) => MsvcRuntime::Dynamic,
            (MsvcRuntime::Static | MsvcRuntime::StaticDebug, true) => MsvcRuntime::StaticDebug,
            (MsvcRuntime::Static | MsvcRuntime::StaticDebug, false) => MsvcRuntime::Static,
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            MsvcRuntime::Dynamic => "/MD",
            MsvcRuntime::DynamicDebug => "/MDd",
            MsvcRuntime::Static => "/MT",
            MsvcRuntime::StaticDebug => "/MTd",
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, MsvcRuntime::Static | MsvcRuntime::StaticDebug)
    }
}

impl Default for MsvcRuntime {
    fn default() -> Self {
        MsvcRuntime::Dynamic
    }
}

/// Non-MSVC C++ runtime linkage (libstdc++/libc++, static or dynamic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CppRuntime {
    Dynamic,
    Static,
}

impl Default for CppRuntime {
    fn default() -> Self {
        CppRuntime::Dynamic
    }
}

impl CppRuntime {
    /// The GCC/Clang linker flag that selects static vs dynamic linkage
    /// of the C++ standard library itself (`libstdc++`/`libc++`).
    pub fn link_flag(&self) -> Option<&'static str> {
        match self {
            CppRuntime::Dynamic => None,
            CppRuntime::Static => Some("-static-libstdc++"),
        }
    }
}

/// What a `source` target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    StaticLibrary,
    SharedLibrary,
    ConsoleApplication,
    DesktopApplication,
}

impl TargetKind {
    pub fn is_library(&self) -> bool {
        matches!(self, TargetKind::StaticLibrary | TargetKind::SharedLibrary)
    }

    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            TargetKind::ConsoleApplication | TargetKind::DesktopApplication
        )
    }
}

/// The eight-level ordered superset of warning presets (§3): each preset
/// includes every flag of the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningPreset {
    None,
    Minimal,
    Extra,
    Error,
    Pedantic,
    Strict,
    StrictPedantic,
    VeryStrict,
}

impl Default for WarningPreset {
    fn default() -> Self {
        WarningPreset::Minimal
    }
}

/// Whether a target links against a threading library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadModel {
    None,
    Posix,
}

impl Default for ThreadModel {
    fn default() -> Self {
        ThreadModel::None
    }
}

/// How a built executable is to be invoked for local `run` actions. Out
/// of scope for the core build itself but carried through the project
/// model since script/process targets reference it for their own
/// invocation, and downstream tooling (out of scope here) consumes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfiguration {
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Per-platform fields that can appear under a `<platform>` dotted-key
/// override (§3's override grammar) once resolved down to a single
/// effective object for one (configuration, platform) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOverrides {
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    #[serde(default)]
    pub linker_flags: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
}

/// A condition-filter value (§3): either a single configuration/platform
/// name, or a list of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(String),
    Many(Vec<String>),
}

impl ConditionValue {
    fn contains(&self, needle: &str) -> bool {
        match self {
            ConditionValue::Single(s) => s == needle,
            ConditionValue::Many(items) => items.iter().any(|s| s == needle),
        }
    }
}

/// The four per-target condition filters (§3) that gate whether a target
/// participates in a build for the active `(configuration, platform)`
/// pair. Flattened into every target variant so they read as ordinary
/// target properties in the project description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConditions {
    #[serde(default)]
    pub only_in_configuration: Option<ConditionValue>,
    #[serde(default)]
    pub not_in_configuration: Option<ConditionValue>,
    #[serde(default)]
    pub only_in_platform: Option<ConditionValue>,
    #[serde(default)]
    pub not_in_platform: Option<ConditionValue>,
}

impl TargetConditions {
    /// Whether a target carrying these conditions participates in a
    /// build for `configuration` on `platform`.
    pub fn matches(&self, configuration: &str, platform: &str) -> bool {
        if let Some(only) = &self.only_in_configuration {
            if !only.contains(configuration) {
                return false;
            }
        }
        if let Some(not) = &self.not_in_configuration {
            if not.contains(configuration) {
                return false;
            }
        }
        if let Some(only) = &self.only_in_platform {
            if !only.contains(platform) {
                return false;
            }
        }
        if let Some(not) = &self.not_in_platform {
            if not.contains(platform) {
                return false;
            }
        }
        true
    }
}

/// Common fields shared by every `source` target, after dotted-key
/// override resolution has already collapsed configuration/platform
/// variance into one effective value per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTarget {
    pub kind: TargetKind,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    #[serde(default)]
    pub linker_flags: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub links: Vec<InternedString>,
    #[serde(default)]
    pub project_static_links: Vec<InternedString>,
    #[serde(default)]
    pub precompiled_header: Option<String>,
    #[serde(default)]
    pub cpp_standard: Option<CppStandard>,
    #[serde(default)]
    pub warning_preset: WarningPreset,
    #[serde(default)]
    pub thread_model: ThreadModel,
    #[serde(default)]
    pub msvc_runtime: Option<MsvcRuntime>,
    #[serde(default)]
    pub cpp_runtime: Option<CppRuntime>,
    #[serde(default)]
    pub position_independent_code: Option<bool>,
    #[serde(default)]
    pub run_configuration: Option<RunConfiguration>,
    #[serde(flatten)]
    pub conditions: TargetConditions,
}

impl Default for Language {
    fn default() -> Self {
        Language::Cxx
    }
}

/// A `cmake` target: an external CMake-configured subdirectory built as
/// part of this workspace's graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CMakeTarget {
    pub location: String,
    #[serde(default)]
    pub build_type: Option<String>,
    #[serde(default)]
    pub defines: BTreeMap<String, String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(flatten)]
    pub conditions: TargetConditions,
}

/// A `subProject` target: a nested project description, inheriting the
/// parent's resolved toolchain unless it declares its own (§3 ambient
/// clarification).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubProjectTarget {
    pub location: String,
    #[serde(default)]
    pub toolchain: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(flatten)]
    pub conditions: TargetConditions,
}

/// A `script` target: a file invoked through an interpreter inferred
/// from its extension, unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTarget {
    pub path: String,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(flatten)]
    pub conditions: TargetConditions,
}

impl ScriptTarget {
    /// Resolve the interpreter to invoke: the explicit override if one
    /// is given, else inferred from the script's extension, else `None`
    /// meaning "invoke the path directly as an executable".
    pub fn resolved_interpreter(&self) -> Option<&str> {
        if let Some(explicit) = &self.interpreter {
            return Some(explicit.as_str());
        }
        let ext = std::path::Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())?;
        match ext.to_ascii_lowercase().as_str() {
            "sh" => Some("sh"),
            "py" => Some("python3"),
            "rb" => Some("ruby"),
            "pl" => Some("perl"),
            "lua" => Some("lua"),
            "bat" | "cmd" => Some("cmd"),
            "ps1" => Some("powershell"),
            _ => None,
        }
    }
}

/// A `process` target: an arbitrary executable invoked with arguments.
/// Defaults its working directory to the workspace root (§3 ambient
/// clarification), not the executable's own location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTarget {
    pub path: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(flatten)]
    pub conditions: TargetConditions,
}

/// The five-way target tagged union (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TargetDefinition {
    Source(SourceTarget),
    CMake(CMakeTarget),
    SubProject(SubProjectTarget),
    Script(ScriptTarget),
    Process(ProcessTarget),
}

/// A named target within a workspace: the resolved name plus its
/// tagged-union definition, after override resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: InternedString,
    pub definition: TargetDefinition,
}

impl Target {
    pub fn as_source(&self) -> Option<&SourceTarget> {
        match &self.definition {
            TargetDefinition::Source(s) => Some(s),
            _ => None,
        }
    }

    /// The §3 condition filters declared on whichever variant this
    /// target is.
    pub fn conditions(&self) -> &TargetConditions {
        match &self.definition {
            TargetDefinition::Source(s) => &s.conditions,
            TargetDefinition::CMake(s) => &s.conditions,
            TargetDefinition::SubProject(s) => &s.conditions,
            TargetDefinition::Script(s) => &s.conditions,
            TargetDefinition::Process(s) => &s.conditions,
        }
    }

    /// Whether this target participates in a build for `configuration`
    /// on `platform`, per its `onlyIn*`/`notIn*` filters.
    pub fn matches_conditions(&self, configuration: &str, platform: &str) -> bool {
        self.conditions().matches(configuration, platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_presets_are_ordered_supersets() {
        assert!(WarningPreset::None < WarningPreset::Minimal);
        assert!(WarningPreset::Minimal < WarningPreset::Extra);
        assert!(WarningPreset::Extra < WarningPreset::Error);
        assert!(WarningPreset::Error < WarningPreset::Pedantic);
        assert!(WarningPreset::Pedantic < WarningPreset::Strict);
        assert!(WarningPreset::Strict < WarningPreset::StrictPedantic);
        assert!(WarningPreset::StrictPedantic < WarningPreset::VeryStrict);
    }

    #[test]
    fn msvc_runtime_preserves_static_dynamic_across_debug_switch() {
        assert_eq!(
            MsvcRuntime::Static.for_debug(true),
            MsvcRuntime::StaticDebug
        );
        assert_eq!(MsvcRuntime::Dynamic.for_debug(true), MsvcRuntime::DynamicDebug);
        assert_eq!(MsvcRuntime::StaticDebug.for_debug(false), MsvcRuntime::Static);
    }

    #[test]
    fn script_interpreter_inferred_from_extension() {
        let s = ScriptTarget {
            path: "tools/gen.py".into(),
            interpreter: None,
            arguments: Vec::new(),
            working_dir: None,
            conditions: Default::default(),
        };
        assert_eq!(s.resolved_interpreter(), Some("python3"));
    }

    #[test]
    fn script_interpreter_override_wins() {
        let s = ScriptTarget {
            path: "tools/gen.py".into(),
            interpreter: Some("custom-python".into()),
            arguments: Vec::new(),
            working_dir: None,
            conditions: Default::default(),
        };
        assert_eq!(s.resolved_interpreter(), Some("custom-python"));
    }

    #[test]
    fn unrecognized_extension_has_no_interpreter() {
        let s = ScriptTarget {
            path: "tools/run.exe".into(),
            interpreter: None,
            arguments: Vec::new(),
            working_dir: None,
            conditions: Default::default(),
        };
        assert_eq!(s.resolved_interpreter(), None);
    }

    #[test]
    fn only_in_platform_excludes_other_platforms() {
        let conditions = TargetConditions {
            only_in_platform: Some(ConditionValue::Single("windows".to_string())),
            ..Default::default()
        };
        assert!(conditions.matches("Debug", "windows"));
        assert!(!conditions.matches("Debug", "linux"));
    }

    #[test]
    fn not_in_configuration_excludes_named_configuration() {
        let conditions = TargetConditions {
            not_in_configuration: Some(ConditionValue::Many(vec![
                "Release".to_string(),
                "Profile".to_string(),
            ])),
            ..Default::default()
        };
        assert!(conditions.matches("Debug", "linux"));
        assert!(!conditions.matches("Release", "linux"));
    }

    #[test]
    fn no_conditions_matches_everything() {
        assert!(TargetConditions::default().matches("Debug", "linux"));
    }
}
