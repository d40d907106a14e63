//! Build configurations (§3): the named optimization/debug presets a
//! workspace's `configurations` list selects among.

use serde::{Deserialize, Serialize};

use crate::util::hash::Fingerprint;

/// The five-boolean/enum fingerprint of a configuration's fields (§10's
/// glossary entry "Configuration fingerprint"). Hex-encoded SHA256.
pub type ConfigurationFingerprint = String;

/// The eight-way optimization level a configuration may request.
/// `CompilerDefault` leaves the decision to the compiler's own default
/// (no `-O`/`/O` flag emitted at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptimizationLevel {
    CompilerDefault,
    None,
    O1,
    O2,
    O3,
    Debug,
    Size,
    Fast,
}

impl OptimizationLevel {
    pub fn is_optimized(&self) -> bool {
        !matches!(
            self,
            OptimizationLevel::CompilerDefault | OptimizationLevel::None | OptimizationLevel::Debug
        )
    }
}

/// One entry of a workspace's `configurations` list (§3's "named tuple").
/// Five well-known preset names have fixed field values; a project may
/// also define its own named configurations with arbitrary fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfiguration {
    pub name: String,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: OptimizationLevel,
    #[serde(default)]
    pub link_time_optimization: bool,
    #[serde(default)]
    pub debug_symbols: bool,
    #[serde(default)]
    pub strip_symbols: bool,
    #[serde(default)]
    pub enable_profiling: bool,
}

fn default_optimization_level() -> OptimizationLevel {
    OptimizationLevel::CompilerDefault
}

impl BuildConfiguration {
    /// Build a configuration from one of the five well-known preset
    /// names, or fall back to a reasonable inference from the name for
    /// anything else a project defines on its own.
    pub fn named(name: &str) -> Self {
        match name {
            "Release" => BuildConfiguration {
                name: name.to_string(),
                optimization_level: OptimizationLevel::O3,
                link_time_optimization: true,
                debug_symbols: false,
                strip_symbols: true,
                enable_profiling: false,
            },
            "Debug" => BuildConfiguration {
                name: name.to_string(),
                optimization_level: OptimizationLevel::Debug,
                link_time_optimization: false,
                debug_symbols: true,
                strip_symbols: false,
                enable_profiling: false,
            },
            "RelWithDebInfo" => BuildConfiguration {
                name: name.to_string(),
                optimization_level: OptimizationLevel::O2,
                link_time_optimization: false,
                debug_symbols: true,
                strip_symbols: false,
                enable_profiling: false,
            },
            "MinSizeRel" => BuildConfiguration {
                name: name.to_string(),
                optimization_level: OptimizationLevel::Size,
                link_time_optimization: true,
                debug_symbols: false,
                strip_symbols: true,
                enable_profiling: false,
            },
            "Profile" => BuildConfiguration {
                name: name.to_string(),
                optimization_level: OptimizationLevel::O2,
                link_time_optimization: false,
                debug_symbols: true,
                strip_symbols: false,
                enable_profiling: true,
            },
            other => BuildConfiguration {
                name: other.to_string(),
                optimization_level: default_optimization_level(),
                link_time_optimization: false,
                debug_symbols: false,
                strip_symbols: false,
                enable_profiling: false,
            },
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(
            self.optimization_level,
            OptimizationLevel::None | OptimizationLevel::Debug
        ) || (self.debug_symbols && !self.optimization_level.is_optimized())
    }

    /// Hash of the active configuration's fields, used as one of the
    /// three key components of a cache entry (§4.6) and to invalidate
    /// every target when the active configuration's settings change.
    pub fn fingerprint(&self) -> ConfigurationFingerprint {
        let mut fp = Fingerprint::new();
        fp.update_str(self.name.as_str())
            .update_str(&format!("{:?}", self.optimization_level))
            .update_bool(self.link_time_optimization)
            .update_bool(self.debug_symbols)
            .update_bool(self.strip_symbols)
            .update_bool(self.enable_profiling);
        fp.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_preset_is_optimized_and_stripped() {
        let cfg = BuildConfiguration::named("Release");
        assert_eq!(cfg.optimization_level, OptimizationLevel::O3);
        assert!(cfg.link_time_optimization);
        assert!(cfg.strip_symbols);
        assert!(!cfg.is_debug());
    }

    #[test]
    fn debug_preset_carries_symbols_without_optimization() {
        let cfg = BuildConfiguration::named("Debug");
        assert_eq!(cfg.optimization_level, OptimizationLevel::Debug);
        assert!(cfg.debug_symbols);
        assert!(cfg.is_debug());
    }

    #[test]
    fn profile_preset_enables_profiling_without_stripping() {
        let cfg = BuildConfiguration::named("Profile");
        assert!(cfg.enable_profiling);
        assert!(!cfg.strip_symbols);
    }

    #[test]
    fn unknown_name_falls_back_to_compiler_default() {
        let cfg = BuildConfiguration::named("Sanitize");
        assert_eq!(cfg.optimization_level, OptimizationLevel::CompilerDefault);
    }

    #[test]
    fn fingerprint_changes_with_fields() {
        let release = BuildConfiguration::named("Release");
        let debug = BuildConfiguration::named("Debug");
        assert_ne!(release.fingerprint(), debug.fingerprint());
    }
}
