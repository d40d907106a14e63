//! Warning preset flag tables (§3, §4.1).
//!
//! Each preset is a strict superset of the ones before it. `error` is the
//! one preset that also changes behavior (treat warnings as errors)
//! rather than purely adding diagnostic flags.

use crate::core::target::WarningPreset;

/// GCC/Clang flags contributed by a single preset tier (not cumulative;
/// callers walk every tier up to and including the requested preset).
fn gcc_tier_flags(preset: WarningPreset) -> &'static [&'static str] {
    match preset {
        WarningPreset::None => &[],
        WarningPreset::Minimal => &["-Wall"],
        WarningPreset::Extra => &["-Wextra"],
        WarningPreset::Error => &[],
        WarningPreset::Pedantic => &["-Wpedantic"],
        WarningPreset::Strict => &["-Wshadow", "-Wconversion", "-Wsign-conversion"],
        WarningPreset::StrictPedantic => &["-Wold-style-cast", "-Wcast-align", "-Wunused"],
        WarningPreset::VeryStrict => &[
            "-Wdouble-promotion",
            "-Wformat=2",
            "-Wimplicit-fallthrough",
            "-Wnon-virtual-dtor",
            "-Woverloaded-virtual",
            "-Wnull-dereference",
        ],
    }
}

fn msvc_tier_flags(preset: WarningPreset) -> &'static [&'static str] {
    match preset {
        WarningPreset::None => &["/W0"],
        WarningPreset::Minimal => &["/W1"],
        WarningPreset::Extra => &["/W3"],
        WarningPreset::Error => &[],
        WarningPreset::Pedantic => &["/W4"],
        WarningPreset::Strict => &["/w14242", "/w14254", "/w14263"],
        WarningPreset::StrictPedantic => &["/w14265", "/w14287", "/we4289"],
        WarningPreset::VeryStrict => &["/Wall", "/wd4514", "/wd4710", "/wd4820"],
    }
}

/// All cumulative tiers from `None` up to and including `preset`.
fn tiers_up_to(preset: WarningPreset) -> Vec<WarningPreset> {
    [
        WarningPreset::None,
        WarningPreset::Minimal,
        WarningPreset::Extra,
        WarningPreset::Error,
        WarningPreset::Pedantic,
        WarningPreset::Strict,
        WarningPreset::StrictPedantic,
        WarningPreset::VeryStrict,
    ]
    .into_iter()
    .filter(|t| *t <= preset)
    .collect()
}

/// The full cumulative GCC/Clang warning flag list for `preset`, plus
/// `-Werror` when `preset >= Error`.
pub fn gcc_flags(preset: WarningPreset) -> Vec<&'static str> {
    let mut flags: Vec<&'static str> = tiers_up_to(preset)
        .into_iter()
        .flat_map(gcc_tier_flags)
        .copied()
        .collect();
    if preset >= WarningPreset::Error {
        flags.push("-Werror");
    }
    flags
}

/// The full cumulative MSVC warning flag list for `preset`, plus `/WX`
/// when `preset >= Error`. The numeric `/W<n>` flags are not additive in
/// MSVC's own model, so only the highest one among the selected tiers is
/// kept; the `/w1<code>`-style per-warning flags remain cumulative.
pub fn msvc_flags(preset: WarningPreset) -> Vec<&'static str> {
    let mut level_flag: Option<&'static str> = None;
    let mut extra: Vec<&'static str> = Vec::new();

    for tier in tiers_up_to(preset) {
        for flag in msvc_tier_flags(tier) {
            if flag.starts_with("/W") && !flag.starts_with("/w") {
                level_flag = Some(flag);
            } else {
                extra.push(flag);
            }
        }
    }

    let mut flags: Vec<&'static str> = level_flag.into_iter().collect();
    flags.extend(extra);
    if preset >= WarningPreset::Error {
        flags.push("/WX");
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_cumulative_supersets_gcc() {
        let minimal = gcc_flags(WarningPreset::Minimal);
        let extra = gcc_flags(WarningPreset::Extra);
        for flag in &minimal {
            assert!(extra.contains(flag));
        }
        assert!(extra.len() > minimal.len());
    }

    #[test]
    fn error_preset_adds_werror() {
        let flags = gcc_flags(WarningPreset::Error);
        assert!(flags.contains(&"-Werror"));
        assert!(!gcc_flags(WarningPreset::Pedantic).contains(&"-Werror"));
    }

    #[test]
    fn msvc_error_preset_adds_wx() {
        let flags = msvc_flags(WarningPreset::Error);
        assert!(flags.contains(&"/WX"));
    }

    #[test]
    fn very_strict_is_the_largest_gcc_set() {
        let very_strict = gcc_flags(WarningPreset::VeryStrict);
        let strict_pedantic = gcc_flags(WarningPreset::StrictPedantic);
        assert!(very_strict.len() > strict_pedantic.len());
    }
}
