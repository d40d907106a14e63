//! The per-invocation build context: the resolved workspace, the active
//! configuration, the resolved toolchain, and the output directory
//! layout every other piece of the builder is threaded through.

use std::path::{Path, PathBuf};

use crate::builder::toolchain::{CxxOptions, ResolvedToolchain, Toolchain};
use crate::core::abi::Architecture;
use crate::core::configuration::BuildConfiguration;
use crate::core::target::{CppRuntime, MsvcRuntime};
use crate::core::workspace::Workspace;
use crate::util::hash::Fingerprint;

/// Everything a build needs to know that doesn't vary per-target: the
/// workspace, which configuration is active, and the toolchain resolved
/// for this invocation.
pub struct BuildContext {
    pub workspace: Workspace,
    pub configuration: BuildConfiguration,
    pub resolved: ResolvedToolchain,
    /// The active platform identifier (§3: `"linux"`/`"macos"`/`"windows"`)
    /// used to evaluate targets' `onlyInPlatform`/`notInPlatform` filters.
    pub platform: String,
}

impl BuildContext {
    pub fn new(
        workspace: Workspace,
        configuration: BuildConfiguration,
        resolved: ResolvedToolchain,
        platform: impl Into<String>,
    ) -> Self {
        BuildContext {
            workspace,
            configuration,
            resolved,
            platform: platform.into(),
        }
    }

    pub fn toolchain(&self) -> &dyn Toolchain {
        self.resolved.toolchain.as_ref()
    }

    pub fn architecture(&self) -> &Architecture {
        &self.resolved.architecture
    }

    /// `<workingDir>/build/<configuration>` (§6's "Output artifacts").
    pub fn build_out(&self) -> PathBuf {
        self.workspace
            .resolved_working_dir()
            .join("build")
            .join(&self.configuration.name)
    }

    /// `<buildOut>/.cache`, where both the incremental cache entries and
    /// the supported-flag probe cache are persisted.
    pub fn cache_dir(&self) -> PathBuf {
        self.build_out().join(".cache")
    }

    pub fn is_debug(&self) -> bool {
        self.configuration.is_debug()
    }

    /// The optimization flags this toolchain spells for the active
    /// configuration's optimization level.
    pub fn optimization_flags(&self) -> Vec<String> {
        use crate::core::configuration::OptimizationLevel;
        let gcc_like = self.toolchain().platform().is_gcc_like();
        match self.configuration.optimization_level {
            OptimizationLevel::CompilerDefault => vec![],
            OptimizationLevel::None => vec![if gcc_like { "-O0" } else { "/Od" }.to_string()],
            OptimizationLevel::O1 => vec![if gcc_like { "-O1" } else { "/O1" }.to_string()],
            OptimizationLevel::O2 => vec![if gcc_like { "-O2" } else { "/O2" }.to_string()],
            OptimizationLevel::O3 => vec![if gcc_like { "-O3" } else { "/Ox" }.to_string()],
            OptimizationLevel::Debug => vec![if gcc_like { "-Og" } else { "/Od" }.to_string()],
            OptimizationLevel::Size => vec![if gcc_like { "-Os" } else { "/O1" }.to_string()],
            OptimizationLevel::Fast => vec![if gcc_like { "-Ofast" } else { "/Ox" }.to_string()],
        }
    }

    pub fn debug_flags(&self) -> Vec<String> {
        if !self.configuration.debug_symbols {
            return Vec::new();
        }
        if self.toolchain().platform().is_gcc_like() {
            vec!["-g".to_string()]
        } else {
            vec!["/Zi".to_string()]
        }
    }

    /// Windows/MSVC CRT variant for the active configuration, preserving
    /// static/dynamic from the target's own `msvcRuntime` override.
    pub fn msvc_runtime_for(&self, requested: Option<MsvcRuntime>) -> MsvcRuntime {
        requested.unwrap_or_default().for_debug(self.is_debug())
    }

    pub fn cxx_options(&self, cpp_runtime: Option<CppRuntime>, msvc_runtime: Option<MsvcRuntime>) -> CxxOptions {
        CxxOptions {
            std: None,
            exceptions: true,
            rtti: true,
            runtime: cpp_runtime,
            msvc_runtime: self.msvc_runtime_for(msvc_runtime),
            is_debug: self.is_debug(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        self.workspace.project_dir()
    }

    /// The toolchain half of a cache key (§4.6): kind, resolved target
    /// triple, and probed compiler version, so switching compilers or
    /// cross-compiling to a different triple invalidates every entry.
    pub fn toolchain_fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(self.resolved.descriptor.kind.as_str())
            .update_str(&self.resolved.architecture.target_triple.to_string())
            .update_str(&self.resolved.compiler_version);
        fp.finish()
    }

    /// The configuration half of a cache key (§4.6).
    pub fn configuration_fingerprint(&self) -> String {
        self.configuration.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::resolve::SupportedFlags;
    use crate::builder::toolchain::GccToolchain;
    use crate::core::abi::{
        Architecture, BuildPathStyle, BuildStrategy, ToolchainDescriptor, ToolchainType,
    };
    use crate::builder::toolchain::ToolchainPlatform;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn ctx(config_name: &str) -> BuildContext {
        let workspace = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named(config_name)],
            vec![],
            vec![],
            BTreeMap::new(),
            PathBuf::from("/tmp/demo"),
        )
        .unwrap();

        let toolchain = GccToolchain::new(
            PathBuf::from("gcc"),
            PathBuf::from("g++"),
            PathBuf::from("ar"),
            ToolchainPlatform::Gcc,
        );
        let architecture = Architecture::host_native();
        let descriptor = ToolchainDescriptor {
            kind: ToolchainType::Gcc,
            compiler_c: PathBuf::from("gcc"),
            compiler_cpp: PathBuf::from("g++"),
            compiler_rc: None,
            linker: PathBuf::from("g++"),
            archiver: PathBuf::from("ar"),
            profiler: None,
            strategy: BuildStrategy::Ninja,
            build_path_style: BuildPathStyle::Gnu,
        };
        let resolved = ResolvedToolchain {
            toolchain: Box::new(toolchain),
            descriptor,
            architecture,
            supported_flags: SupportedFlags::default(),
            compiler_version: String::new(),
        };

        BuildContext::new(workspace, BuildConfiguration::named(config_name), resolved, "linux")
    }

    #[test]
    fn build_out_embeds_configuration_name() {
        let release = ctx("Release");
        let debug = ctx("Debug");
        assert_ne!(release.build_out(), debug.build_out());
        assert!(release.build_out().ends_with("build/Release"));
    }

    #[test]
    fn release_is_optimized_and_not_debug() {
        let release = ctx("Release");
        assert!(!release.is_debug());
        assert!(release.optimization_flags().iter().any(|f| f == "-O3"));
        assert!(release.debug_flags().is_empty());
    }

    #[test]
    fn debug_configuration_emits_debug_symbols() {
        let debug = ctx("Debug");
        assert!(debug.is_debug());
        assert!(debug.debug_flags().iter().any(|f| f == "-g"));
    }
}
