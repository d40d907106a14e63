//! GCC/Clang toolchain implementation (§4.4): GCC, Clang, Apple Clang and
//! MinGW all share one argv grammar (`-`-prefixed flags), differing only
//! in a handful of family-specific spellings (PCH flag, C++ runtime
//! selection, shared-library suffix).

use std::path::{Path, PathBuf};

use crate::core::target::Language;

use super::{
    ArchiveInput, CommandSpec, CompileInput, CxxOptions, LinkInput, ResourceInput, Toolchain,
    ToolchainPlatform,
};

/// GCC/Clang-family toolchain (Unix-like systems, MinGW on Windows).
#[derive(Debug, Clone)]
pub struct GccToolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
    pub windres: Option<PathBuf>,
    pub family: ToolchainPlatform,
}

impl GccToolchain {
    pub fn new(cc: PathBuf, cxx: PathBuf, ar: PathBuf, family: ToolchainPlatform) -> Self {
        GccToolchain {
            cc,
            cxx,
            ar,
            windres: None,
            family,
        }
    }

    pub fn with_windres(mut self, windres: PathBuf) -> Self {
        self.windres = Some(windres);
        self
    }

    /// Infer the C++ compiler path from the C compiler path: `gcc` -> `g++`,
    /// `clang` -> `clang++`, `cc` -> `c++`, prefixed variants preserved
    /// (`x86_64-linux-gnu-gcc` -> `x86_64-linux-gnu-g++`).
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if cc_str.ends_with("gcc") {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 2]));
        }
        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");
        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    fn uses_include_pch(&self) -> bool {
        matches!(
            self.family,
            ToolchainPlatform::Clang | ToolchainPlatform::AppleClang
        )
    }
}

impl Toolchain for GccToolchain {
    fn platform(&self) -> ToolchainPlatform {
        self.family
    }

    fn compiler_path(&self) -> &Path {
        &self.cc
    }

    fn cxx_compiler_path(&self) -> &Path {
        &self.cxx
    }

    fn archiver_path(&self) -> &Path {
        &self.ar
    }

    fn resource_compiler_path(&self) -> Option<&Path> {
        self.windres.as_deref()
    }

    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        let compiler = match lang {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        };

        let mut cmd = CommandSpec::new(compiler).arg("-c");

        // {languageStandard}
        if lang == Language::Cxx {
            if let Some(opts) = cxx_opts {
                if let Some(std) = opts.std {
                    cmd = cmd.arg(format!("-std={}", std.gnu_flag_value()));
                }
            }
        }

        // {diagnosticsFlags}
        if input.diagnostics_color {
            cmd = cmd.arg("-fdiagnostics-color=always");
        }

        // {warningFlags}
        cmd = cmd.args(input.warning_flags.iter().cloned());

        // {optimizationFlags}
        cmd = cmd.args(input.optimization_flags.iter().cloned());

        // {debugFlags}
        cmd = cmd.args(input.debug_flags.iter().cloned());

        // {ltoFlags}
        if input.lto {
            cmd = cmd.arg("-flto");
        }

        // {rttiExceptionsFlags}
        if lang == Language::Cxx {
            if let Some(opts) = cxx_opts {
                if !opts.exceptions {
                    cmd = cmd.arg("-fno-exceptions");
                }
                if !opts.rtti {
                    cmd = cmd.arg("-fno-rtti");
                }
                if let Some(runtime) = opts.runtime {
                    if let Some(flag) = runtime.link_flag() {
                        cmd = cmd.arg(flag);
                    }
                }
            }
        }

        // {archFlags}
        cmd = cmd.args(input.arch_flags.iter().cloned());

        // {sysrootFlags}
        cmd = cmd.args(input.sysroot_flags.iter().cloned());

        // {includeDirs}
        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }

        // {defines}
        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
                None => cmd = cmd.arg(format!("-D{}", name)),
            }
        }

        // {pchUseFlag}
        if let Some(pch) = &input.pch {
            if self.uses_include_pch() {
                cmd = cmd.arg("-include-pch").arg(pch.pch_file.display().to_string());
            } else {
                // GCC finds the `.gch` by searching the include path for
                // `<header>.gch` next to `<header>`, so the PCH's own
                // directory must be on the include path.
                if let Some(dir) = pch.pch_file.parent() {
                    cmd = cmd.arg(format!("-I{}", dir.display()));
                }
                cmd = cmd.arg("-include").arg(pch.header.display().to_string());
            }
        }

        // {targetSpecificOptions}
        cmd = cmd.args(input.cflags.iter().cloned());

        // {inputFile}
        cmd = cmd.arg(input.source.display().to_string());

        // {outputSpecFlag}
        cmd = cmd.arg("-o").arg(input.output.display().to_string());

        // {dependencyGenerationFlags}
        if let Some(dep) = &input.dependency_output {
            let tmp = dep.with_extension("d.Td");
            cmd = cmd
                .arg("-MT")
                .arg(input.output.display().to_string())
                .arg("-MMD")
                .arg("-MP")
                .arg("-MF")
                .arg(tmp.display().to_string());
        }

        cmd
    }

    fn resource_command(&self, input: &ResourceInput) -> Option<CommandSpec> {
        let windres = self.windres.as_ref()?;
        let mut cmd = CommandSpec::new(windres).arg("-O").arg("coff");
        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }
        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
                None => cmd = cmd.arg(format!("-D{}", name)),
            }
        }
        cmd = cmd
            .arg(input.source.display().to_string())
            .arg("-o")
            .arg(input.output.display().to_string());
        Some(cmd)
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.ar).arg("rcs");
        cmd = cmd.arg(input.output.display().to_string());
        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }
        cmd
    }

    fn link_shared_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.link_command(input, driver, cxx_opts, true)
    }

    fn link_exe_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
    ) -> CommandSpec {
        self.link_command(input, driver, cxx_opts, false)
    }

    fn object_extension(&self) -> &str {
        "o"
    }

    fn static_lib_extension(&self) -> &str {
        "a"
    }

    fn shared_lib_extension(&self) -> &str {
        if cfg!(target_os = "macos") {
            "dylib"
        } else if matches!(self.family, ToolchainPlatform::Mingw) {
            "dll"
        } else {
            "so"
        }
    }

    fn exe_extension(&self) -> &str {
        if matches!(self.family, ToolchainPlatform::Mingw) {
            "exe"
        } else {
            ""
        }
    }

    fn static_lib_prefix(&self) -> &str {
        "lib"
    }

    fn shared_lib_prefix(&self) -> &str {
        "lib"
    }

    fn pch_extension(&self) -> &str {
        if self.uses_include_pch() {
            "pch"
        } else {
            "gch"
        }
    }
}

impl GccToolchain {
    fn link_command(
        &self,
        input: &LinkInput,
        driver: Language,
        cxx_opts: Option<&CxxOptions>,
        shared: bool,
    ) -> CommandSpec {
        let linker = match driver {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        };

        let mut cmd = CommandSpec::new(linker);
        if shared {
            cmd = cmd.arg("-shared");
        }

        if input.lto {
            cmd = cmd.arg("-flto");
        }

        if driver == Language::Cxx {
            if let Some(opts) = cxx_opts {
                if let Some(runtime) = opts.runtime {
                    if let Some(flag) = runtime.link_flag() {
                        cmd = cmd.arg(flag);
                    }
                }
            }
        }

        cmd = cmd.arg("-o").arg(input.output.display().to_string());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("-L{}", dir.display()));
        }

        // Dynamic links are plain `-l<name>`; static links are wrapped in
        // `-Wl,-Bstatic ... -Wl,-Bdynamic` so the linker doesn't prefer a
        // shared object of the same name found earlier on the search
        // path. A cyclic static-link group additionally gets
        // `--start-group`/`--end-group` so mutual references resolve.
        if !input.static_libs.is_empty() {
            if input.cyclic_static_libs {
                cmd = cmd.arg("-Wl,--start-group");
            }
            cmd = cmd.arg("-Wl,-Bstatic");
            for lib in &input.static_libs {
                cmd = cmd.arg(format!("-l{}", lib));
            }
            cmd = cmd.arg("-Wl,-Bdynamic");
            if input.cyclic_static_libs {
                cmd = cmd.arg("-Wl,--end-group");
            }
        }

        for lib in &input.dynamic_libs {
            cmd = cmd.arg(format!("-l{}", lib));
        }

        cmd = cmd.args(input.ldflags.iter().cloned());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{CppStandard, MsvcRuntime};

    fn toolchain() -> GccToolchain {
        GccToolchain::new(
            PathBuf::from("gcc"),
            PathBuf::from("g++"),
            PathBuf::from("ar"),
            ToolchainPlatform::Gcc,
        )
    }

    fn input() -> CompileInput {
        CompileInput {
            source: PathBuf::from("src/main.c"),
            output: PathBuf::from("obj/main.o"),
            include_dirs: vec![PathBuf::from("/usr/include")],
            defines: vec![
                ("DEBUG".to_string(), None),
                ("VERSION".to_string(), Some("1".to_string())),
            ],
            cflags: vec!["-Wall".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn compile_command_uses_c_driver() {
        let cmd = toolchain().compile_command(&input(), Language::C, None);
        assert_eq!(cmd.program, PathBuf::from("gcc"));
        assert!(cmd.args.contains(&"-c".to_string()));
        assert!(cmd.args.contains(&"-I/usr/include".to_string()));
        assert!(cmd.args.contains(&"-DDEBUG".to_string()));
        assert!(cmd.args.contains(&"-DVERSION=1".to_string()));
    }

    #[test]
    fn cxx_compile_uses_standard_flag() {
        let cxx_opts = CxxOptions {
            std: Some(CppStandard::Cpp17),
            exceptions: true,
            rtti: true,
            runtime: None,
            msvc_runtime: MsvcRuntime::default(),
            is_debug: false,
        };
        let cmd = toolchain().compile_command(&input(), Language::Cxx, Some(&cxx_opts));
        assert_eq!(cmd.program, PathBuf::from("g++"));
        assert!(cmd.args.contains(&"-std=c++17".to_string()));
    }

    #[test]
    fn dependency_generation_emits_temp_file_target() {
        let mut i = input();
        i.dependency_output = Some(PathBuf::from("dep/main.d"));
        let cmd = toolchain().compile_command(&i, Language::C, None);
        assert!(cmd.args.contains(&"-MMD".to_string()));
        assert!(cmd.args.iter().any(|a| a.ends_with(".d.Td")));
    }

    #[test]
    fn flag_order_is_fixed() {
        let mut i = input();
        i.warning_flags = vec!["-Wall".to_string()];
        i.optimization_flags = vec!["-O2".to_string()];
        let cxx_opts = CxxOptions {
            std: Some(CppStandard::Cpp17),
            ..Default::default()
        };
        let cmd = toolchain().compile_command(&i, Language::Cxx, Some(&cxx_opts));
        let std_pos = cmd.args.iter().position(|a| a == "-std=c++17").unwrap();
        let warn_pos = cmd.args.iter().position(|a| a == "-Wall").unwrap();
        let opt_pos = cmd.args.iter().position(|a| a == "-O2").unwrap();
        let include_pos = cmd.args.iter().position(|a| a.starts_with("-I")).unwrap();
        assert!(std_pos < warn_pos);
        assert!(warn_pos < opt_pos);
        assert!(opt_pos < include_pos);
    }

    #[test]
    fn archive_command_uses_rcs() {
        let input = ArchiveInput {
            objects: vec![PathBuf::from("obj/a.o"), PathBuf::from("obj/b.o")],
            output: PathBuf::from("lib/libfoo.a"),
        };
        let cmd = toolchain().archive_command(&input);
        assert_eq!(cmd.program, PathBuf::from("ar"));
        assert!(cmd.args.contains(&"rcs".to_string()));
    }

    #[test]
    fn cyclic_static_links_wrapped_in_group() {
        let link_input = LinkInput {
            objects: vec![PathBuf::from("obj/a.o")],
            output: PathBuf::from("bin/app"),
            lib_dirs: vec![],
            dynamic_libs: vec![],
            static_libs: vec!["a".to_string(), "b".to_string()],
            cyclic_static_libs: true,
            ldflags: vec![],
            lto: false,
            suppress_default_libs: false,
            is_debug: false,
        };
        let cmd = toolchain().link_exe_command(&link_input, Language::C, None);
        assert!(cmd.args.contains(&"-Wl,--start-group".to_string()));
        assert!(cmd.args.contains(&"-Wl,--end-group".to_string()));
    }
}
