//! Toolchain resolution (§4.2): presets, predefined-macro compiler
//! identification, supported-flag discovery, architecture normalization,
//! and MSVC `vswhere`/`vcvarsall` auto-detection.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use which::which;

use crate::core::abi::{
    Architecture, BuildPathStyle, BuildStrategy, Cpu, TargetTriple, ToolchainDescriptor,
    ToolchainType,
};
use crate::core::error::BuildError;
use crate::util::process::ProcessBuilder;

use super::{GccToolchain, Toolchain, ToolchainPlatform};
#[cfg(target_os = "windows")]
use super::{EnvWrapper, MsvcToolchain};

/// A compiler's supported command-line flags, as parsed from its `--help`
/// output, persisted to a per-compiler cache file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SupportedFlags {
    flags: BTreeSet<String>,
}

impl SupportedFlags {
    pub fn contains(&self, flag: &str) -> bool {
        self.flags.contains(&flag.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    fn from_help_output(stdout: &str) -> Self {
        let flags = stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('-'))
            .filter_map(|line| line.split_whitespace().next())
            .map(|tok| tok.trim_end_matches(',').to_lowercase())
            .collect();
        SupportedFlags { flags }
    }
}

/// A fully resolved toolchain: the `dyn Toolchain` command generator, the
/// descriptor used for cache-key/fingerprint purposes, the resolved
/// architecture, and the compiler's supported-flag set.
pub struct ResolvedToolchain {
    pub toolchain: Box<dyn Toolchain>,
    pub descriptor: ToolchainDescriptor,
    pub architecture: Architecture,
    pub supported_flags: SupportedFlags,
    pub compiler_version: String,
}

/// Normalize a user-supplied architecture string to its canonical
/// spelling (§4.2). Returns `None` for unrecognized input.
fn normalize_arch_name(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "x86" | "i686" => Some("x86"),
        "x64" | "x86_64" | "amd64" => Some("x86_64"),
        "arm64" | "aarch64" => Some("arm64"),
        "arm" => Some("arm"),
        "universal" | "universal2" => Some("universal"),
        _ => None,
    }
}

/// Resolve the `Architecture` for a build given the user-requested
/// architecture string (or `None` to use the host's native architecture).
pub fn resolve_architecture(requested: Option<&str>) -> Result<Architecture, BuildError> {
    let Some(requested) = requested else {
        return Ok(Architecture::host_native());
    };

    let normalized = normalize_arch_name(requested).ok_or_else(|| BuildError::ArchitectureUnsupported {
        arch: requested.to_string(),
    })?;

    let host = TargetTriple::host();
    if normalized == "universal" {
        if host.os != "macos" {
            return Err(BuildError::ArchitectureUnsupported {
                arch: requested.to_string(),
            });
        }
        let target = TargetTriple::new("x86_64", &host.vendor, &host.os, host.env.as_deref());
        return Ok(Architecture {
            host_triple: host,
            cpu: Cpu::X64,
            target_triple: target,
            extra_options: vec!["-arch".to_string(), "x86_64".to_string(), "-arch".to_string(), "arm64".to_string()],
        });
    }

    let target = TargetTriple::new(normalized, &host.vendor, &host.os, host.env.as_deref());
    let cpu = Cpu::normalize(normalized);
    Ok(Architecture {
        host_triple: host,
        target_triple: target,
        cpu,
        extra_options: Vec::new(),
    })
}

/// Resolve a toolchain by preset name (`msvc`, `llvm`, `apple-llvm`,
/// `gcc`) or fall back to environment/PATH auto-detection when `preset`
/// is `None`.
///
/// `cache_dir` is where the supported-flag probe result is persisted
/// (`<buildOut>/.cache`), keyed by `ToolchainDescriptor::flag_cache_key`.
pub fn resolve_toolchain(
    preset: Option<&str>,
    arch: Option<&str>,
    cache_dir: &Path,
) -> Result<ResolvedToolchain, BuildError> {
    let architecture = resolve_architecture(arch)?;

    let (toolchain, kind): (Box<dyn Toolchain>, ToolchainType) = match preset {
        Some("msvc") => try_resolve_msvc(&architecture)?,
        Some("llvm") | Some("apple-llvm") => try_resolve_gcc_like(Some("clang"))?,
        Some("gcc") => try_resolve_gcc_like(Some("gcc"))?,
        Some(other) => try_resolve_gcc_like(Some(other))?,
        None => {
            if cfg!(target_os = "windows") {
                try_resolve_msvc(&architecture).or_else(|_| try_resolve_gcc_like(None))?
            } else {
                try_resolve_gcc_like(None)?
            }
        }
    };

    let strategy = if matches!(kind, ToolchainType::Msvc) {
        BuildStrategy::Makefile
    } else {
        BuildStrategy::Ninja
    };
    let build_path_style = if matches!(kind, ToolchainType::Msvc) {
        BuildPathStyle::Msvc
    } else {
        BuildPathStyle::Gnu
    };

    let descriptor = ToolchainDescriptor {
        kind,
        compiler_c: toolchain.compiler_path().to_path_buf(),
        compiler_cpp: toolchain.cxx_compiler_path().to_path_buf(),
        compiler_rc: toolchain.resource_compiler_path().map(Path::to_path_buf),
        linker: toolchain.cxx_compiler_path().to_path_buf(),
        archiver: toolchain.archiver_path().to_path_buf(),
        profiler: None,
        strategy,
        build_path_style,
    };

    let compiler_version = probe_compiler_version(toolchain.cxx_compiler_path());

    let supported_flags = if matches!(kind, ToolchainType::Msvc) {
        SupportedFlags::default()
    } else {
        load_or_probe_supported_flags(&toolchain, &descriptor, &architecture, cache_dir)
    };

    Ok(ResolvedToolchain {
        toolchain,
        descriptor,
        architecture,
        supported_flags,
        compiler_version,
    })
}

fn probe_compiler_version(compiler: &Path) -> String {
    ProcessBuilder::new(compiler)
        .arg("--version")
        .exec()
        .ok()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .unwrap_or_default()
}

fn load_or_probe_supported_flags(
    toolchain: &dyn Toolchain,
    descriptor: &ToolchainDescriptor,
    arch: &Architecture,
    cache_dir: &Path,
) -> SupportedFlags {
    let key = descriptor.flag_cache_key(arch);
    let cache_path = cache_dir.join(format!("toolchain-flags-{}.json", key));

    if let Ok(text) = std::fs::read_to_string(&cache_path) {
        if let Ok(cached) = serde_json::from_str::<SupportedFlags>(&text) {
            return cached;
        }
    }

    let flags = probe_supported_flags(toolchain);

    if let Ok(text) = serde_json::to_string(&flags) {
        if std::fs::create_dir_all(cache_dir).is_ok() {
            let tmp = cache_path.with_extension("json.tmp");
            if std::fs::write(&tmp, &text).is_ok() {
                let _ = std::fs::rename(&tmp, &cache_path);
            }
        }
    }

    flags
}

fn probe_supported_flags(toolchain: &dyn Toolchain) -> SupportedFlags {
    let is_clang = matches!(
        toolchain.platform(),
        ToolchainPlatform::Clang | ToolchainPlatform::AppleClang
    );

    let output = if is_clang {
        ProcessBuilder::new(toolchain.cxx_compiler_path())
            .arg("-cc1")
            .arg("--help")
            .exec()
    } else {
        ProcessBuilder::new(toolchain.cxx_compiler_path())
            .arg("--help=common,optimizers,target,warnings,undocumented")
            .exec()
    };

    match output {
        Ok(out) => SupportedFlags::from_help_output(&String::from_utf8_lossy(&out.stdout)),
        Err(_) => SupportedFlags::default(),
    }
}

/// Dump a compiler's predefined macros and classify its family per
/// §4.2's conjunction rules.
fn identify_compiler_family(cc: &Path) -> Result<ToolchainType, BuildError> {
    let output = ProcessBuilder::new(cc)
        .arg("-dM")
        .arg("-E")
        .arg("-x")
        .arg("c")
        .arg("-")
        .stdin(Vec::new())
        .exec();

    let Ok(output) = output else {
        return Err(BuildError::ToolchainResolution {
            message: format!("failed to probe predefined macros for `{}`", cc.display()),
        });
    };

    let macros = String::from_utf8_lossy(&output.stdout);
    let has = |name: &str| macros.contains(name);

    let version_output = ProcessBuilder::new(cc).arg("--version").exec();
    let version_text = version_output
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
        .unwrap_or_default();

    let is_mingw = has("__MINGW32__") || has("__MINGW64__");

    if has("__EMSCRIPTEN__") {
        Ok(ToolchainType::Emscripten)
    } else if version_text.contains("Apple LLVM") {
        Ok(ToolchainType::AppleLlvm)
    } else if has("__clang__") && is_mingw {
        Ok(ToolchainType::Mingw)
    } else if has("__clang__") {
        Ok(ToolchainType::Llvm)
    } else if has("__INTEL_COMPILER") {
        Ok(ToolchainType::IntelClassic)
    } else if has("__GNUC__") && is_mingw {
        Ok(ToolchainType::Mingw)
    } else if has("__GNUC__") {
        Ok(ToolchainType::Gcc)
    } else {
        Err(BuildError::ToolchainResolution {
            message: format!(
                "could not classify compiler `{}`: no recognized predefined macros",
                cc.display()
            ),
        })
    }
}

fn toolchain_platform_for(kind: ToolchainType) -> ToolchainPlatform {
    match kind {
        ToolchainType::Gcc => ToolchainPlatform::Gcc,
        ToolchainType::Llvm => ToolchainPlatform::Clang,
        ToolchainType::AppleLlvm => ToolchainPlatform::AppleClang,
        ToolchainType::Mingw => ToolchainPlatform::Mingw,
        ToolchainType::Emscripten => ToolchainPlatform::Emscripten,
        ToolchainType::IntelClassic => ToolchainPlatform::IntelClassic,
        ToolchainType::Msvc => ToolchainPlatform::Msvc,
    }
}

fn try_resolve_gcc_like(
    hint: Option<&str>,
) -> Result<(Box<dyn Toolchain>, ToolchainType), BuildError> {
    let cc = find_c_like_compiler(hint)?;
    let kind = identify_compiler_family(&cc)?;
    let family = toolchain_platform_for(kind);

    let cxx = std::env::var("CXX")
        .ok()
        .map(PathBuf::from)
        .filter(|p| p.exists() || which(p).is_ok())
        .or_else(|| find_cxx_counterpart(&cc))
        .unwrap_or_else(|| GccToolchain::infer_cxx(&cc));

    let ar = std::env::var("AR")
        .ok()
        .map(PathBuf::from)
        .or_else(|| which("ar").ok())
        .or_else(|| which("llvm-ar").ok())
        .ok_or_else(|| BuildError::ToolchainResolution {
            message: "no archiver (ar/llvm-ar) found on PATH".to_string(),
        })?;

    let windres = which("windres").ok();

    let mut toolchain = GccToolchain::new(cc, cxx, ar, family);
    if let Some(windres) = windres {
        toolchain = toolchain.with_windres(windres);
    }

    Ok((Box::new(toolchain), kind))
}

fn find_c_like_compiler(hint: Option<&str>) -> Result<PathBuf, BuildError> {
    if let Ok(cc) = std::env::var("CC") {
        if let Ok(path) = which(&cc) {
            return Ok(path);
        }
        return Ok(PathBuf::from(cc));
    }

    let candidates: &[&str] = match hint {
        Some("clang") => &["clang", "cc"],
        Some("gcc") => &["gcc", "cc"],
        Some(other) => {
            if let Ok(path) = which(other) {
                return Ok(path);
            }
            &["cc", "gcc", "clang"]
        }
        None => &["cc", "gcc", "clang"],
    };

    for candidate in candidates {
        if let Ok(path) = which(candidate) {
            return Ok(path);
        }
    }

    Err(BuildError::ToolchainResolution {
        message: "no C compiler found on PATH; set CC or install gcc/clang".to_string(),
    })
}

fn find_cxx_counterpart(cc: &Path) -> Option<PathBuf> {
    let name = cc.file_name()?.to_str()?;
    if name.contains("clang") {
        which("clang++").ok()
    } else {
        which("c++").ok().or_else(|| which("g++").ok())
    }
}

#[cfg(target_os = "windows")]
fn try_resolve_msvc(
    architecture: &Architecture,
) -> Result<(Box<dyn Toolchain>, ToolchainType), BuildError> {
    // Already inside a Developer Command Prompt.
    if let (Ok(cl), Ok(_), Ok(_)) = (which("cl"), std::env::var("INCLUDE"), std::env::var("LIB")) {
        let lib = which("lib").map_err(|_| BuildError::ToolchainResolution {
            message: "cl.exe found but lib.exe missing from PATH".to_string(),
        })?;
        let link = which("link").map_err(|_| BuildError::ToolchainResolution {
            message: "cl.exe found but link.exe missing from PATH".to_string(),
        })?;
        let rc = which("rc").ok();
        let mut toolchain = MsvcToolchain::new(cl, lib, link);
        if let Some(rc) = rc {
            toolchain = toolchain.with_rc(rc);
        }
        return Ok((Box::new(toolchain), ToolchainType::Msvc));
    }

    auto_detect_msvc(architecture)
}

#[cfg(not(target_os = "windows"))]
fn try_resolve_msvc(
    _architecture: &Architecture,
) -> Result<(Box<dyn Toolchain>, ToolchainType), BuildError> {
    Err(BuildError::ToolchainResolution {
        message: "MSVC is only available on Windows".to_string(),
    })
}

/// The `host_target` spelling `vcvarsall.bat` expects, given the host and
/// requested target architectures.
#[cfg(target_os = "windows")]
fn vcvars_cpu_spelling(cpu: Cpu) -> Result<&'static str, BuildError> {
    match cpu {
        Cpu::X64 => Ok("x64"),
        Cpu::X86 => Ok("x86"),
        Cpu::Arm64 => Ok("arm64"),
        Cpu::Arm => Ok("arm"),
        other => Err(BuildError::ArchitectureUnsupported {
            arch: format!("{:?}", other),
        }),
    }
}

#[cfg(target_os = "windows")]
fn vcvars_arch_arg(architecture: &Architecture) -> Result<String, BuildError> {
    let host = vcvars_cpu_spelling(architecture.host_triple.cpu())?;
    let target = vcvars_cpu_spelling(architecture.cpu)?;

    Ok(if host == target {
        target.to_string()
    } else {
        format!("{}_{}", host, target)
    })
}

#[cfg(target_os = "windows")]
fn auto_detect_msvc(
    architecture: &Architecture,
) -> Result<(Box<dyn Toolchain>, ToolchainType), BuildError> {
    let vswhere = find_vswhere().ok_or_else(|| BuildError::ToolchainResolution {
        message: "vswhere.exe not found; install Visual Studio Build Tools".to_string(),
    })?;

    let output = ProcessBuilder::new(&vswhere)
        .args([
            "-latest",
            "-requires",
            "Microsoft.VisualStudio.Component.VC.Tools.x86.x64",
            "-property",
            "installationPath",
            "-format",
            "value",
        ])
        .exec()
        .map_err(|e| BuildError::ToolchainResolution {
            message: format!("failed to run vswhere.exe: {}", e),
        })?;

    let vs_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if vs_path.is_empty() {
        return Err(BuildError::ToolchainResolution {
            message: "vswhere.exe found no Visual Studio installation".to_string(),
        });
    }

    let vcvarsall = PathBuf::from(&vs_path)
        .join("VC")
        .join("Auxiliary")
        .join("Build")
        .join("vcvarsall.bat");
    if !vcvarsall.exists() {
        return Err(BuildError::ToolchainResolution {
            message: format!("vcvarsall.bat not found at {}", vcvarsall.display()),
        });
    }

    let arch_arg = vcvars_arch_arg(architecture)?;

    let temp_dir = std::env::temp_dir();
    let temp_batch = temp_dir.join("buildcore_vcvars.bat");
    let batch_content = format!(
        "@echo off\r\ncall \"{}\" {} >nul 2>&1\r\nif errorlevel 1 exit /b 1\r\nset\r\n",
        vcvarsall.display(),
        arch_arg
    );
    std::fs::write(&temp_batch, &batch_content).map_err(|e| BuildError::ToolchainResolution {
        message: format!("failed to write vcvarsall probe script: {}", e),
    })?;

    let output = ProcessBuilder::new("cmd")
        .arg("/c")
        .arg(&temp_batch)
        .exec();
    let _ = std::fs::remove_file(&temp_batch);

    let output = output.map_err(|e| BuildError::ToolchainResolution {
        message: format!("failed to run vcvarsall.bat: {}", e),
    })?;
    if !output.status.success() {
        return Err(BuildError::ToolchainResolution {
            message: "vcvarsall.bat exited with a non-zero status".to_string(),
        });
    }

    let env_output = String::from_utf8_lossy(&output.stdout);
    let mut env_vars: HashMap<String, String> = HashMap::new();
    for line in env_output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            env_vars.insert(key.to_uppercase(), value.to_string());
        }
    }

    let path_value = env_vars.get("PATH").cloned().unwrap_or_default();
    if path_value.is_empty() {
        return Err(BuildError::ToolchainResolution {
            message: "vcvarsall.bat produced an empty PATH".to_string(),
        });
    }

    let (cl, lib, link, rc) = find_msvc_tools_in_path(&path_value);
    let (Some(cl), Some(lib), Some(link)) = (cl, lib, link) else {
        return Err(BuildError::ToolchainResolution {
            message: "could not locate cl.exe/lib.exe/link.exe in the vcvarsall environment"
                .to_string(),
        });
    };

    let important_vars = ["PATH", "INCLUDE", "LIB", "LIBPATH", "VSCMD_ARG_TGT_ARCH"];
    let captured_env: Vec<(String, String)> = important_vars
        .iter()
        .filter_map(|&key| env_vars.get(key).map(|v| (key.to_string(), v.clone())))
        .collect();

    let mut toolchain = MsvcToolchain::new(cl, lib, link);
    if let Some(rc) = rc {
        toolchain = toolchain.with_rc(rc);
    }

    Ok((
        Box::new(EnvWrapper::new(toolchain, captured_env)),
        ToolchainType::Msvc,
    ))
}

#[cfg(target_os = "windows")]
fn find_vswhere() -> Option<PathBuf> {
    let program_files_x86 = std::env::var("ProgramFiles(x86)")
        .unwrap_or_else(|_| "C:\\Program Files (x86)".to_string());
    let standard_path = PathBuf::from(&program_files_x86)
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");
    if standard_path.exists() {
        return Some(standard_path);
    }
    which("vswhere").ok()
}

#[cfg(target_os = "windows")]
fn find_msvc_tools_in_path(
    path: &str,
) -> (Option<PathBuf>, Option<PathBuf>, Option<PathBuf>, Option<PathBuf>) {
    let mut cl = None;
    let mut lib = None;
    let mut link = None;
    let mut rc = None;

    for dir in path.split(';') {
        let dir = PathBuf::from(dir);
        if !dir.exists() {
            continue;
        }
        if cl.is_none() && dir.join("cl.exe").exists() {
            cl = Some(dir.join("cl.exe"));
        }
        if lib.is_none() && dir.join("lib.exe").exists() {
            lib = Some(dir.join("lib.exe"));
        }
        if link.is_none() && dir.join("link.exe").exists() {
            link = Some(dir.join("link.exe"));
        }
        if rc.is_none() && dir.join("rc.exe").exists() {
            rc = Some(dir.join("rc.exe"));
        }
        if cl.is_some() && lib.is_some() && link.is_some() && rc.is_some() {
            break;
        }
    }

    (cl, lib, link, rc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_arch_spellings() {
        assert_eq!(normalize_arch_name("x64"), Some("x86_64"));
        assert_eq!(normalize_arch_name("amd64"), Some("x86_64"));
        assert_eq!(normalize_arch_name("aarch64"), Some("arm64"));
        assert_eq!(normalize_arch_name("i686"), Some("x86"));
        assert_eq!(normalize_arch_name("potato"), None);
    }

    #[test]
    fn unsupported_arch_name_errors() {
        let err = resolve_architecture(Some("potato")).unwrap_err();
        assert!(matches!(err, BuildError::ArchitectureUnsupported { .. }));
    }

    #[test]
    fn supported_flags_parses_dash_prefixed_lines() {
        let help = "  -Wall                   Enable most warnings\n\
                     Some unrelated text\n\
                     -O2                      Optimize\n";
        let flags = SupportedFlags::from_help_output(help);
        assert!(flags.contains("-Wall"));
        assert!(flags.contains("-O2"));
        assert!(!flags.is_empty());
    }

    #[test]
    fn no_host_default_architecture_uses_native() {
        let arch = resolve_architecture(None).unwrap();
        assert_eq!(arch.host_triple, arch.target_triple);
    }
}
