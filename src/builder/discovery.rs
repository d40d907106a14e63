//! Source discovery (§4.3): enumerating the ordered list of source files
//! for a `source` target and deriving their per-file output paths.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::core::target::{Language, SourceTarget};
use crate::util::fs::relative_path;

/// One file in a target's discovered source group, in compile order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    /// Absolute path to the source file on disk.
    pub absolute: PathBuf,
    /// Forward-slash-normalized path relative to the target's source
    /// root, used to derive output paths and for deterministic sorting.
    pub logical: String,
    /// `true` for the synthetic precompiled-header entry injected at the
    /// head of the group (§4.3's "every other compile gains an implicit
    /// ordering edge `pch -> object`").
    pub is_pch: bool,
}

impl DiscoveredSource {
    pub fn object_path(&self, build_out: &Path, object_ext: &str) -> PathBuf {
        build_out.join("obj").join(format!("{}.{}", self.logical, object_ext))
    }

    pub fn dependency_path(&self, build_out: &Path) -> PathBuf {
        build_out.join("dep").join(format!("{}.d", self.logical))
    }

    pub fn assembly_path(&self, build_out: &Path) -> PathBuf {
        build_out.join("asm").join(format!("{}.asm", self.logical))
    }
}

/// The ordered list of files to compile for one target, plus any files
/// referenced but not found (explicit-list mode only), plus any pair of
/// logical paths that collide only by ASCII case (§8: "a source file
/// whose name differs only in case on a case-insensitive filesystem").
#[derive(Debug, Clone, Default)]
pub struct SourceGroup {
    pub sources: Vec<DiscoveredSource>,
    pub missing: Vec<String>,
    pub case_collisions: Vec<(String, String)>,
}

/// Find pairs of sources whose logical path is identical once
/// lowercased but differs in its original casing. A case-insensitive
/// filesystem would have already collapsed these into one directory
/// entry; on a case-sensitive one they are still two distinct source
/// files that would alias the same object path once the toolchain's
/// own path handling lowercases or folds them, so the second is flagged
/// rather than silently compiled twice.
fn find_case_collisions(sources: &[DiscoveredSource]) -> Vec<(String, String)> {
    let mut by_lower: std::collections::HashMap<String, &str> = std::collections::HashMap::new();
    let mut collisions = Vec::new();
    for s in sources {
        let lower = s.logical.to_ascii_lowercase();
        match by_lower.get(lower.as_str()) {
            Some(first) if *first != s.logical => {
                collisions.push((first.to_string(), s.logical.clone()));
            }
            _ => {
                by_lower.insert(lower, &s.logical);
            }
        }
    }
    collisions
}

fn source_extensions(language: Language) -> &'static [&'static str] {
    match language {
        Language::C => &["c"],
        Language::Cxx => &["cpp", "cc", "cxx", "c++"],
    }
}

fn has_glob_metacharacters(entry: &str) -> bool {
    entry.contains('*') || entry.contains('?') || entry.contains('[')
}

fn normalize_logical(root: &Path, path: &Path) -> String {
    relative_path(root, path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Substring match against the normalized path, plus `fnmatch`-style glob
/// match against just the filename (§4.3's two exclusion mechanisms).
fn is_excluded(logical: &str, excludes: &[String]) -> bool {
    let filename = logical.rsplit('/').next().unwrap_or(logical);
    excludes.iter().any(|pattern| {
        logical.contains(pattern.as_str())
            || Pattern::new(pattern)
                .map(|p| p.matches(filename))
                .unwrap_or(false)
    })
}

/// Discover the source group for a target rooted at `source_root`
/// (the workspace's resolved working directory).
///
/// Explicit-list mode is chosen structurally — a non-empty `files` list
/// with no glob metacharacters in any entry — never by whether the files
/// happen to exist on disk. A missing entry is reported in `missing`
/// (§4.3 step 1), it does not fall back to scan mode.
pub fn discover(target: &SourceTarget, source_root: &Path) -> SourceGroup {
    let explicit_mode =
        !target.files.is_empty() && target.files.iter().all(|f| !has_glob_metacharacters(f));

    let mut group = if explicit_mode {
        discover_explicit(target, source_root)
    } else {
        discover_by_scan(target, source_root)
    };

    group.case_collisions = find_case_collisions(&group.sources);

    if let Some(pch_header) = &target.precompiled_header {
        let absolute = source_root.join(pch_header);
        let logical = normalize_logical(source_root, &absolute);
        group.sources.insert(
            0,
            DiscoveredSource {
                absolute,
                logical,
                is_pch: true,
            },
        );
    }

    group
}

fn discover_explicit(target: &SourceTarget, source_root: &Path) -> SourceGroup {
    let mut sources = Vec::new();
    let mut missing = Vec::new();

    for entry in &target.files {
        let absolute = source_root.join(entry);
        if !absolute.is_file() {
            missing.push(entry.clone());
            continue;
        }
        sources.push(DiscoveredSource {
            logical: normalize_logical(source_root, &absolute),
            absolute,
            is_pch: false,
        });
    }

    sources.sort_by(|a, b| a.logical.cmp(&b.logical));
    SourceGroup {
        sources,
        missing,
        case_collisions: Vec::new(),
    }
}

fn discover_by_scan(target: &SourceTarget, source_root: &Path) -> SourceGroup {
    let extensions = source_extensions(target.language);
    let roots: Vec<&str> = if target.files.is_empty() {
        vec!["."]
    } else {
        target.files.iter().map(String::as_str).collect()
    };

    let mut sources = Vec::new();

    for root in roots {
        let root_path = source_root.join(root);

        if has_glob_metacharacters(root) {
            let pattern = root_path.to_string_lossy().to_string();
            if let Ok(paths) = glob::glob(&pattern) {
                for entry in paths.flatten() {
                    if entry.is_file() {
                        push_if_matching(&entry, source_root, extensions, &target.exclude, &mut sources);
                    }
                }
            }
            continue;
        }

        if root_path.is_file() {
            push_if_matching(&root_path, source_root, extensions, &target.exclude, &mut sources);
            continue;
        }

        for entry in walkdir::WalkDir::new(&root_path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_file() {
                push_if_matching(entry.path(), source_root, extensions, &target.exclude, &mut sources);
            }
        }
    }

    sources.sort_by(|a, b| a.logical.cmp(&b.logical));
    sources.dedup_by(|a, b| a.logical == b.logical);
    SourceGroup {
        sources,
        missing: Vec::new(),
        case_collisions: Vec::new(),
    }
}

fn push_if_matching(
    path: &Path,
    source_root: &Path,
    extensions: &[&str],
    excludes: &[String],
    out: &mut Vec<DiscoveredSource>,
) {
    let matches_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
        .unwrap_or(false);
    if !matches_ext {
        return;
    }

    let logical = normalize_logical(source_root, path);
    if is_excluded(&logical, excludes) {
        return;
    }

    out.push(DiscoveredSource {
        absolute: path.to_path_buf(),
        logical,
        is_pch: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::TargetKind;
    use tempfile::TempDir;

    fn base_target() -> SourceTarget {
        SourceTarget {
            kind: TargetKind::ConsoleApplication,
            language: Language::Cxx,
            files: Vec::new(),
            exclude: Vec::new(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            compiler_flags: Vec::new(),
            linker_flags: Vec::new(),
            libraries: Vec::new(),
            links: Vec::new(),
            project_static_links: Vec::new(),
            precompiled_header: None,
            cpp_standard: None,
            warning_preset: Default::default(),
            thread_model: Default::default(),
            msvc_runtime: None,
            cpp_runtime: None,
            position_independent_code: None,
            run_configuration: None,
            conditions: Default::default(),
        }
    }

    #[test]
    fn scans_recursively_and_filters_by_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src/sub")).unwrap();
        std::fs::write(tmp.path().join("src/main.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("src/sub/helper.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("src/notes.txt"), "").unwrap();

        let target = base_target();
        let group = discover(&target, tmp.path());

        assert_eq!(group.sources.len(), 2);
        assert_eq!(group.sources[0].logical, "src/main.cpp");
        assert_eq!(group.sources[1].logical, "src/sub/helper.cpp");
    }

    #[test]
    fn explicit_file_list_reports_missing_without_failing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.cpp"), "").unwrap();

        let mut target = base_target();
        target.files = vec!["a.cpp".to_string(), "missing.cpp".to_string()];
        let group = discover(&target, tmp.path());

        assert_eq!(group.sources.len(), 1);
        assert_eq!(group.missing, vec!["missing.cpp".to_string()]);
    }

    #[test]
    fn flags_sources_differing_only_by_case() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Main.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("main.cpp"), "").unwrap();

        let target = base_target();
        let group = discover(&target, tmp.path());

        assert_eq!(group.case_collisions.len(), 1);
    }

    #[test]
    fn exclusion_substring_match() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src/generated")).unwrap();
        std::fs::write(tmp.path().join("src/main.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("src/generated/proto.cpp"), "").unwrap();

        let mut target = base_target();
        target.exclude = vec!["generated".to_string()];
        let group = discover(&target, tmp.path());

        assert_eq!(group.sources.len(), 1);
        assert_eq!(group.sources[0].logical, "src/main.cpp");
    }

    #[test]
    fn pch_entry_injected_at_head() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("main.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("pch.hpp"), "").unwrap();

        let mut target = base_target();
        target.precompiled_header = Some("pch.hpp".to_string());
        let group = discover(&target, tmp.path());

        assert!(group.sources[0].is_pch);
        assert_eq!(group.sources[0].logical, "pch.hpp");
    }
}
