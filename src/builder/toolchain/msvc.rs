//! MSVC toolchain implementation (§4.4): `cl.exe`/`lib.exe`/`link.exe`/
//! `rc.exe`, `/`-prefixed flag grammar.

use std::path::{Path, PathBuf};

use crate::core::target::Language;

use super::{
    ArchiveInput, CommandSpec, CompileInput, CxxOptions, LinkInput, ResourceInput, Toolchain,
    ToolchainPlatform,
};

/// MSVC toolchain. Paths are resolved by `resolve::try_detect_msvc` from a
/// `vswhere`/`vcvarsall` probe and usually wrapped in `EnvWrapper` to carry
/// the captured `INCLUDE`/`LIB`/`PATH` environment.
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    pub cl: PathBuf,
    pub lib: PathBuf,
    pub link: PathBuf,
    pub rc: Option<PathBuf>,
}

impl MsvcToolchain {
    pub fn new(cl: PathBuf, lib: PathBuf, link: PathBuf) -> Self {
        MsvcToolchain {
            cl,
            lib,
            link,
            rc: None,
        }
    }

    pub fn with_rc(mut self, rc: PathBuf) -> Self {
        self.rc = Some(rc);
        self
    }
}

impl Toolchain for MsvcToolchain {
    fn platform(&self) -> ToolchainPlatform {
        ToolchainPlatform::Msvc
    }

    fn compiler_path(&self) -> &Path {
        &self.cl
    }

    fn cxx_compiler_path(&self) -> &Path {
        &self.cl
    }

    fn archiver_path(&self) -> &Path {
        &self.lib
    }

    fn resource_compiler_path(&self) -> Option<&Path> {
        self.rc.as_deref()
    }

    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cl).arg("/c").arg("/nologo");

        // Force a source-language interpretation regardless of extension,
        // since the workspace may name arbitrary file extensions.
        if lang == Language::C {
            cmd = cmd.arg("/TC");
        } else {
            cmd = cmd.arg("/TP");
        }

        // {languageStandard}
        if lang == Language::Cxx {
            if let Some(opts) = cxx_opts {
                if let Some(std) = opts.std {
                    if let Some(value) = std.msvc_flag_value() {
                        cmd = cmd.arg(format!("/std:{}", value));
                    }
                }
            }
        }

        // {diagnosticsFlags}
        if input.diagnostics_color {
            cmd = cmd.arg("/diagnostics:color");
        }

        // {warningFlags}
        cmd = cmd.args(input.warning_flags.iter().cloned());

        // {optimizationFlags}
        cmd = cmd.args(input.optimization_flags.iter().cloned());

        // {debugFlags}
        cmd = cmd.args(input.debug_flags.iter().cloned());

        // {ltoFlags}
        if input.lto {
            cmd = cmd.arg("/GL");
        }

        // {rttiExceptionsFlags} + CRT runtime selection
        if lang == Language::Cxx {
            if let Some(opts) = cxx_opts {
                if opts.exceptions {
                    cmd = cmd.arg("/EHsc");
                }
                if !opts.rtti {
                    cmd = cmd.arg("/GR-");
                }
                let runtime = opts.msvc_runtime.for_debug(opts.is_debug);
                cmd = cmd.arg(runtime.flag());
            }
        }

        // {archFlags}
        cmd = cmd.args(input.arch_flags.iter().cloned());

        // {sysrootFlags}
        cmd = cmd.args(input.sysroot_flags.iter().cloned());

        // {includeDirs}
        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("/I{}", dir.display()));
        }

        // {defines}
        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("/D{}={}", name, v)),
                None => cmd = cmd.arg(format!("/D{}", name)),
            }
        }

        // {pchUseFlag}
        if let Some(pch) = &input.pch {
            cmd = cmd
                .arg(format!("/Yu{}", pch.header.display()))
                .arg(format!("/Fp{}", pch.pch_file.display()));
        }

        // {targetSpecificOptions}
        cmd = cmd.args(input.cflags.iter().cloned());

        // {inputFile}
        cmd = cmd.arg(input.source.display().to_string());

        // {outputSpecFlag}
        cmd = cmd.arg(format!("/Fo{}", input.output.display()));

        // {dependencyGenerationFlags}
        if input.dependency_output.is_some() {
            cmd = cmd.arg("/showIncludes");
        }

        cmd
    }

    fn resource_command(&self, input: &ResourceInput) -> Option<CommandSpec> {
        let rc = self.rc.as_ref()?;
        let mut cmd = CommandSpec::new(rc).arg("/nologo");
        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("/I{}", dir.display()));
        }
        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("/D{}={}", name, v)),
                None => cmd = cmd.arg(format!("/D{}", name)),
            }
        }
        cmd = cmd
            .arg(format!("/fo{}", input.output.display()))
            .arg(input.source.display().to_string());
        Some(cmd)
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.lib)
            .arg("/nologo")
            .arg(format!("/OUT:{}", input.output.display()));
        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }
        cmd
    }

    fn link_shared_command(
        &self,
        input: &LinkInput,
        _driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.link_command(input, cxx_opts, true)
    }

    fn link_exe_command(
        &self,
        input: &LinkInput,
        _driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.link_command(input, cxx_opts, false)
    }

    fn object_extension(&self) -> &str {
        "obj"
    }

    fn static_lib_extension(&self) -> &str {
        "lib"
    }

    fn shared_lib_extension(&self) -> &str {
        "dll"
    }

    fn exe_extension(&self) -> &str {
        "exe"
    }

    fn static_lib_prefix(&self) -> &str {
        ""
    }

    fn shared_lib_prefix(&self) -> &str {
        ""
    }

    fn pch_extension(&self) -> &str {
        "pch"
    }

    /// MSVC reports included headers on compile stdout as
    /// `Note: including file:   <path>`, indented by nesting depth. Strip
    /// the prefix and collect the header paths for dependency tracking.
    fn parse_stdout_includes(&self, stdout: &str) -> Vec<PathBuf> {
        const PREFIX: &str = "Note: including file:";
        stdout
            .lines()
            .filter_map(|line| {
                let trimmed = line.trim_start();
                trimmed
                    .strip_prefix(PREFIX)
                    .map(|rest| PathBuf::from(rest.trim()))
            })
            .collect()
    }
}

impl MsvcToolchain {
    fn link_command(
        &self,
        input: &LinkInput,
        cxx_opts: Option<&CxxOptions>,
        shared: bool,
    ) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.link).arg("/nologo");

        if shared {
            cmd = cmd.arg("/DLL");
        }

        if input.lto {
            cmd = cmd.arg("/LTCG");
        }

        if input.is_debug {
            cmd = cmd.arg("/DEBUG");
        }

        cmd = cmd.arg(format!("/OUT:{}", input.output.display()));

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("/LIBPATH:{}", dir.display()));
        }

        for lib in &input.static_libs {
            cmd = cmd.arg(format!("{}.lib", lib));
        }
        for lib in &input.dynamic_libs {
            cmd = cmd.arg(format!("{}.lib", lib));
        }

        if !input.suppress_default_libs {
            cmd = cmd.arg("kernel32.lib");
            if let Some(opts) = cxx_opts {
                let runtime = opts.msvc_runtime.for_debug(opts.is_debug);
                if !runtime.is_static() {
                    cmd = cmd.arg("/NODEFAULTLIB:libcmt.lib");
                }
            }
        } else {
            cmd = cmd.arg("/NODEFAULTLIB");
        }

        cmd = cmd.args(input.ldflags.iter().cloned());
        cmd
    }
}
