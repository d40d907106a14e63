//! Toolchain abstraction for C/C++ compilers (§4.2, §4.4).
//!
//! This module provides a unified interface for generating compiler/linker
//! commands across different toolchains (GCC, Clang, Apple Clang, MSVC),
//! plus the concrete argv-list shape (`CommandSpec`) that the command
//! synthesizer (`builder::plan`) and the build backends consume.
//!
//! Toolchain resolution itself (presets, predefined-macro identification,
//! supported-flag discovery, `vswhere`/`vcvarsall` auto-detection) lives in
//! `resolve`.

use std::path::{Path, PathBuf};

use crate::core::target::{CppRuntime, CppStandard, MsvcRuntime};

mod gcc;
mod msvc;
pub mod resolve;

pub use gcc::GccToolchain;
pub use msvc::MsvcToolchain;
pub use resolve::{resolve_toolchain, ResolvedToolchain, SupportedFlags};

/// C++ compilation options that affect the whole target's command line,
/// as opposed to per-file inputs.
#[derive(Debug, Clone)]
pub struct CxxOptions {
    pub std: Option<CppStandard>,
    pub exceptions: bool,
    pub rtti: bool,
    pub runtime: Option<CppRuntime>,
    pub msvc_runtime: MsvcRuntime,
    pub is_debug: bool,
}

impl Default for CxxOptions {
    fn default() -> Self {
        CxxOptions {
            std: None,
            exceptions: true,
            rtti: true,
            runtime: None,
            msvc_runtime: MsvcRuntime::default(),
            is_debug: false,
        }
    }
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render the full command line for display/echo purposes (§4.5's
    /// "show the whole command" output mode).
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// A precompiled header the current compile should consume.
#[derive(Debug, Clone)]
pub struct PchUse {
    /// The original header source (`.hpp`/`.h`) named by the target.
    pub header: PathBuf,
    /// The compiled PCH artifact (`.gch`/`.pch`) to consume.
    pub pch_file: PathBuf,
}

/// Input for a single-file compile, carrying every field the §4.4 fixed
/// flag-ordering table references. Fields are applied in the order named
/// there; each toolchain implementation emits them in that order using
/// its own flag spellings.
#[derive(Debug, Clone, Default)]
pub struct CompileInput {
    pub source: PathBuf,
    pub output: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<(String, Option<String>)>,
    pub cflags: Vec<String>,
    pub warning_flags: Vec<String>,
    pub optimization_flags: Vec<String>,
    pub debug_flags: Vec<String>,
    pub lto: bool,
    pub arch_flags: Vec<String>,
    pub sysroot_flags: Vec<String>,
    pub pch: Option<PchUse>,
    pub diagnostics_color: bool,
    /// Where to emit the final `.d` dependency file. `None` disables
    /// dependency-file generation for this compile (e.g. the PCH compile
    /// itself still participates in dependency tracking the same way).
    pub dependency_output: Option<PathBuf>,
}

/// Input for compiling a Windows resource (`.rc`) file.
#[derive(Debug, Clone)]
pub struct ResourceInput {
    pub source: PathBuf,
    pub output: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<(String, Option<String>)>,
}

/// Input for an archive step (creating a static library).
#[derive(Debug, Clone)]
pub struct ArchiveInput {
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Input for a link step (shared library or executable).
#[derive(Debug, Clone)]
pub struct LinkInput {
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
    pub lib_dirs: Vec<PathBuf>,
    /// Names from the target's `links` (dynamic link) list.
    pub dynamic_libs: Vec<String>,
    /// Names from the target's `projectStaticLinks` list.
    pub static_libs: Vec<String>,
    /// `true` when `static_libs` forms a cyclic reference among sibling
    /// targets (§8 boundary behavior; §9 open question — GCC/Clang wrap
    /// in a link group, MSVC rejects).
    pub cyclic_static_libs: bool,
    pub ldflags: Vec<String>,
    pub lto: bool,
    /// Suppresses MSVC's automatic `kernel32.lib` + CRT injection
    /// (the target's `staticLinking` override).
    pub suppress_default_libs: bool,
    pub is_debug: bool,
}

/// Language for a compile/link driver invocation.
pub use crate::core::target::Language;

/// The platform/family of a toolchain, as classified by §4.2's
/// predefined-macro probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainPlatform {
    Gcc,
    Clang,
    AppleClang,
    Mingw,
    Msvc,
    Emscripten,
    IntelClassic,
}

impl ToolchainPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainPlatform::Gcc => "gcc",
            ToolchainPlatform::Clang => "clang",
            ToolchainPlatform::AppleClang => "apple-clang",
            ToolchainPlatform::Mingw => "mingw",
            ToolchainPlatform::Msvc => "msvc",
            ToolchainPlatform::Emscripten => "emscripten",
            ToolchainPlatform::IntelClassic => "intel-classic",
        }
    }

    pub fn is_gcc_like(&self) -> bool {
        !matches!(self, ToolchainPlatform::Msvc)
    }
}

/// Trait for toolchain implementations. Each toolchain knows how to
/// generate commands for its specific compiler family and the paths/
/// extensions conventional to it.
pub trait Toolchain: Send + Sync {
    fn platform(&self) -> ToolchainPlatform;
    fn compiler_path(&self) -> &Path;
    fn cxx_compiler_path(&self) -> &Path;
    /// `ar`/`llvm-ar` for GCC/Clang, `lib.exe` for MSVC.
    fn archiver_path(&self) -> &Path;
    fn resource_compiler_path(&self) -> Option<&Path> {
        None
    }

    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec;

    /// `None` when this toolchain has no resource compiler (non-Windows
    /// targets); the caller raises `ResourceCompilerMissing` in that case.
    fn resource_command(&self, _input: &ResourceInput) -> Option<CommandSpec> {
        None
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec;

    fn link_shared_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec;

    fn link_exe_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec;

    fn object_extension(&self) -> &str;
    fn static_lib_extension(&self) -> &str;
    fn shared_lib_extension(&self) -> &str;
    fn exe_extension(&self) -> &str;
    fn static_lib_prefix(&self) -> &str;
    fn shared_lib_prefix(&self) -> &str;

    /// Extension of the compiled precompiled-header artifact: `.gch`
    /// (GCC), `.pch` (Clang and MSVC).
    fn pch_extension(&self) -> &str;

    /// Parse a compile invocation's captured stdout for header paths, for
    /// toolchains that report includes there (MSVC `/showIncludes`)
    /// rather than via a `-MF` dependency file. Non-MSVC toolchains never
    /// call this; it returns an empty list by default.
    fn parse_stdout_includes(&self, _stdout: &str) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// A generic wrapper that injects environment variables into every
/// command a toolchain produces — used to carry the environment delta
/// captured from `vcvarsall.bat` into every compiler/linker/archiver
/// invocation without each call site threading it through by hand.
#[derive(Debug, Clone)]
pub struct EnvWrapper<T> {
    inner: T,
    env_vars: Vec<(String, String)>,
}

impl<T> EnvWrapper<T> {
    pub fn new(inner: T, env_vars: Vec<(String, String)>) -> Self {
        EnvWrapper { inner, env_vars }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn inject_env(&self, mut cmd: CommandSpec) -> CommandSpec {
        for (key, value) in &self.env_vars {
            cmd = cmd.env(key, value);
        }
        cmd
    }
}

impl<T: Toolchain> Toolchain for EnvWrapper<T> {
    fn platform(&self) -> ToolchainPlatform {
        self.inner.platform()
    }

    fn compiler_path(&self) -> &Path {
        self.inner.compiler_path()
    }

    fn cxx_compiler_path(&self) -> &Path {
        self.inner.cxx_compiler_path()
    }

    fn archiver_path(&self) -> &Path {
        self.inner.archiver_path()
    }

    fn resource_compiler_path(&self) -> Option<&Path> {
        self.inner.resource_compiler_path()
    }

    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.inject_env(self.inner.compile_command(input, lang, cxx_opts))
    }

    fn resource_command(&self, input: &ResourceInput) -> Option<CommandSpec> {
        self.inner.resource_command(input).map(|c| self.inject_env(c))
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        self.inject_env(self.inner.archive_command(input))
    }

    fn link_shared_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.inject_env(self.inner.link_shared_command(input, driver, cxx_opts))
    }

    fn link_exe_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.inject_env(self.inner.link_exe_command(input, driver, cxx_opts))
    }

    fn object_extension(&self) -> &str {
        self.inner.object_extension()
    }

    fn static_lib_extension(&self) -> &str {
        self.inner.static_lib_extension()
    }

    fn shared_lib_extension(&self) -> &str {
        self.inner.shared_lib_extension()
    }

    fn exe_extension(&self) -> &str {
        self.inner.exe_extension()
    }

    fn static_lib_prefix(&self) -> &str {
        self.inner.static_lib_prefix()
    }

    fn shared_lib_prefix(&self) -> &str {
        self.inner.shared_lib_prefix()
    }

    fn pch_extension(&self) -> &str {
        self.inner.pch_extension()
    }

    fn parse_stdout_includes(&self, stdout: &str) -> Vec<PathBuf> {
        self.inner.parse_stdout_includes(stdout)
    }
}
