//! Architecture and toolchain descriptors, and the ABI identity derived
//! from them that keys the incremental cache.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::target::TargetKind;
use crate::util::hash::Fingerprint;

/// Normalized CPU architecture, independent of how the host or target
/// triple happens to spell it (`x86_64`, `amd64`, `AMD64` all normalize
/// to `Cpu::X64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cpu {
    X86,
    X64,
    Arm,
    Arm64,
    UniversalMacOs,
    Unknown,
}

impl Cpu {
    /// Normalize a raw architecture string (as found in a target triple,
    /// `uname -m`, or an explicit `architecture` override) to a `Cpu`.
    pub fn normalize(raw: &str) -> Cpu {
        match raw.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Cpu::X64,
            "i386" | "i686" | "x86" => Cpu::X86,
            "aarch64" | "arm64" => Cpu::Arm64,
            "arm" | "armv7" | "armv7l" => Cpu::Arm,
            "universal" | "universal2" => Cpu::UniversalMacOs,
            _ => Cpu::Unknown,
        }
    }
}

/// Target triple components, following the usual
/// `<arch>-<vendor>-<os>[-<env>]` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTriple {
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub env: Option<String>,
}

impl TargetTriple {
    pub fn new(arch: &str, vendor: &str, os: &str, env: Option<&str>) -> Self {
        TargetTriple {
            arch: arch.to_string(),
            vendor: vendor.to_string(),
            os: os.to_string(),
            env: env.map(|s| s.to_string()),
        }
    }

    /// Detect the host target triple from the running process's own
    /// compile-time target info.
    pub fn host() -> Self {
        let arch = std::env::consts::ARCH;
        let os = std::env::consts::OS;

        let (vendor, env) = match os {
            "linux" => ("unknown", Some("gnu")),
            "macos" => ("apple", None),
            "windows" => ("pc", Some("msvc")),
            _ => ("unknown", None),
        };

        TargetTriple::new(arch, vendor, os, env)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() < 3 {
            return None;
        }
        Some(TargetTriple {
            arch: parts[0].to_string(),
            vendor: parts[1].to_string(),
            os: parts[2].to_string(),
            env: parts.get(3).map(|s| s.to_string()),
        })
    }

    pub fn cpu(&self) -> Cpu {
        Cpu::normalize(&self.arch)
    }
}

impl std::fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env {
            Some(env) => write!(f, "{}-{}-{}-{}", self.arch, self.vendor, self.os, env),
            None => write!(f, "{}-{}-{}", self.arch, self.vendor, self.os),
        }
    }
}

/// The resolved architecture for one build: the triple the toolchain
/// runs on, the triple it produces code for, the normalized CPU, and any
/// extra architecture-specific flags (e.g. `-march=`) the project
/// description supplies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Architecture {
    pub host_triple: TargetTriple,
    pub target_triple: TargetTriple,
    pub cpu: Cpu,
    #[serde(default)]
    pub extra_options: Vec<String>,
}

impl Architecture {
    pub fn host_native() -> Self {
        let host = TargetTriple::host();
        let cpu = host.cpu();
        Architecture {
            target_triple: host.clone(),
            host_triple: host,
            cpu,
            extra_options: Vec::new(),
        }
    }

    pub fn is_cross_compile(&self) -> bool {
        self.host_triple != self.target_triple
    }
}

/// Compiler family / vendor identification, from predefined-macro
/// probing (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainType {
    Msvc,
    Llvm,
    AppleLlvm,
    Gcc,
    Mingw,
    Emscripten,
    IntelClassic,
}

impl ToolchainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainType::Msvc => "msvc",
            ToolchainType::Llvm => "llvm",
            ToolchainType::AppleLlvm => "apple-llvm",
            ToolchainType::Gcc => "gcc",
            ToolchainType::Mingw => "mingw",
            ToolchainType::Emscripten => "emscripten",
            ToolchainType::IntelClassic => "intel-classic",
        }
    }
}

/// Which backend strategy a build uses to turn the plan into artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStrategy {
    Makefile,
    Ninja,
    Native,
}

/// How build output directories are laid out for this toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPathStyle {
    /// `build/<configuration>/obj/<path>.o` — POSIX toolchains.
    Gnu,
    /// `build/<configuration>/obj/<path>.obj`, with MSVC's flatter
    /// `/Fo` semantics in mind.
    Msvc,
}

/// The fully resolved toolchain: every tool path plus the strategy and
/// path-style decisions derived from the toolchain type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainDescriptor {
    pub kind: ToolchainType,
    pub compiler_c: PathBuf,
    pub compiler_cpp: PathBuf,
    #[serde(default)]
    pub compiler_rc: Option<PathBuf>,
    pub linker: PathBuf,
    pub archiver: PathBuf,
    #[serde(default)]
    pub profiler: Option<PathBuf>,
    pub strategy: BuildStrategy,
    pub build_path_style: BuildPathStyle,
}

impl ToolchainDescriptor {
    /// The cache key used to look up a persisted supported-flag set
    /// (§4.2: "keyed by compiler path + architecture").
    pub fn flag_cache_key(&self, arch: &Architecture) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(&self.compiler_cpp.display().to_string());
        fp.update_str(&arch.target_triple.to_string());
        fp.finish_short()
    }
}

/// Compiler identity (family + version), used as one of the inputs to
/// the ABI fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerIdentity {
    pub family: String,
    pub version: String,
}

impl CompilerIdentity {
    pub fn new(family: &str, version: &str) -> Self {
        CompilerIdentity {
            family: family.to_string(),
            version: version.to_string(),
        }
    }
}

impl std::fmt::Display for CompilerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.family, self.version)
    }
}

/// The cache-key identity of one built artifact: everything that, if
/// changed, invalidates every object built against it.
#[derive(Debug, Clone)]
pub struct AbiIdentity {
    pub target: TargetTriple,
    pub compiler: CompilerIdentity,
    pub kind: TargetKind,
    pub pic: bool,
    pub public_defines: Vec<String>,
}

impl AbiIdentity {
    pub fn new(target: TargetTriple, compiler: CompilerIdentity, kind: TargetKind) -> Self {
        AbiIdentity {
            target,
            compiler,
            kind,
            pic: kind.is_library(),
            public_defines: Vec::new(),
        }
    }

    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(&self.target.to_string())
            .update_str(&self.compiler.to_string())
            .update_str(&format!("{:?}", self.kind))
            .update_bool(self.pic);

        let mut defines = self.public_defines.clone();
        defines.sort();
        for define in &defines {
            fp.update_str(define);
        }
        fp.finish_short()
    }

    pub fn is_compatible(&self, other: &AbiIdentity) -> bool {
        self.target == other.target
            && self.compiler.family == other.compiler.family
            && self.kind == other.kind
            && self.pic == other.pic
            && self.public_defines == other.public_defines
    }
}

/// Check whether `current` requires a rebuild relative to `cached`,
/// returning a human-readable reason when it does.
pub fn needs_rebuild(current: &AbiIdentity, cached: &AbiIdentity) -> Option<String> {
    if current.target != cached.target {
        return Some(format!(
            "target changed: {} -> {}",
            cached.target, current.target
        ));
    }
    if current.compiler.family != cached.compiler.family {
        return Some(format!(
            "compiler changed: {} -> {}",
            cached.compiler.family, current.compiler.family
        ));
    }
    if current.kind != cached.kind {
        return Some(format!(
            "target kind changed: {:?} -> {:?}",
            cached.kind, current.kind
        ));
    }
    if current.pic != cached.pic {
        return Some(format!(
            "PIC setting changed: {} -> {}",
            cached.pic, current.pic
        ));
    }
    if current.public_defines != cached.public_defines {
        return Some("public defines changed".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_normalizes_common_spellings() {
        assert_eq!(Cpu::normalize("x86_64"), Cpu::X64);
        assert_eq!(Cpu::normalize("AMD64"), Cpu::X64);
        assert_eq!(Cpu::normalize("aarch64"), Cpu::Arm64);
        assert_eq!(Cpu::normalize("unsupported-arch"), Cpu::Unknown);
    }

    #[test]
    fn target_triple_round_trips_through_parse() {
        let t = TargetTriple::parse("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(t.arch, "x86_64");
        assert_eq!(t.env, Some("gnu".to_string()));
    }

    #[test]
    fn host_native_architecture_is_not_cross_compiling() {
        let arch = Architecture::host_native();
        assert!(!arch.is_cross_compile());
    }

    #[test]
    fn abi_fingerprint_is_deterministic() {
        let target = TargetTriple::new("x86_64", "unknown", "linux", Some("gnu"));
        let compiler = CompilerIdentity::new("gcc", "13.0");
        let a = AbiIdentity::new(target.clone(), compiler.clone(), TargetKind::StaticLibrary);
        let b = AbiIdentity::new(target, compiler, TargetKind::StaticLibrary);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn needs_rebuild_detects_compiler_change() {
        let target = TargetTriple::new("x86_64", "unknown", "linux", Some("gnu"));
        let gcc = AbiIdentity::new(
            target.clone(),
            CompilerIdentity::new("gcc", "13.0"),
            TargetKind::StaticLibrary,
        );
        let clang = AbiIdentity::new(
            target,
            CompilerIdentity::new("clang", "17.0"),
            TargetKind::StaticLibrary,
        );
        assert!(needs_rebuild(&clang, &gcc).is_some());
        assert!(!clang.is_compatible(&gcc));
    }
}
