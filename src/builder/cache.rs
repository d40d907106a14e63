//! The incremental cache (§4.6): per-target, per-configuration,
//! per-toolchain up-to-date checks, persisted atomically to
//! `<buildOut>/.cache/<hash>.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::core::error::BuildError;
use crate::util::hash::{sha256_file, Fingerprint};

/// `{mtime, size, contentHash?}` for one source or header file that
/// participates in a target's up-to-date check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFingerprint {
    pub mtime_secs: u64,
    pub size: u64,
    pub content_hash: Option<String>,
}

impl FileFingerprint {
    pub fn capture(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_secs = meta
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok(FileFingerprint {
            mtime_secs,
            size: meta.len(),
            content_hash: None,
        })
    }

    fn matches(&self, path: &Path) -> bool {
        match Self::capture(path) {
            Ok(current) => current.mtime_secs == self.mtime_secs && current.size == self.size,
            Err(_) => false,
        }
    }
}

/// One target's cache entry (§3 "Cache entry"): keyed implicitly by the
/// file it's stored under (target identity + toolchain fingerprint +
/// configuration fingerprint folded into the file name), valued by the
/// last build's command hash, the fingerprint of every file that
/// participated, and the extra-hash inputs that invalidate everything.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheEntry {
    pub last_build_hash: String,
    pub per_file_fingerprints: BTreeMap<PathBuf, FileFingerprint>,
    pub extra_hashes: BTreeMap<String, String>,
}

impl CacheEntry {
    /// A coarser check than [`CacheEntry::object_up_to_date`] for compile
    /// units with no dependency file (resource compiles, precompiled
    /// headers before their first build): the object exists, the source
    /// itself hasn't changed, and neither the command-line nor extra-hash
    /// fingerprint has.
    pub fn simple_up_to_date(
        &self,
        object: &Path,
        source: &Path,
        command_hash: &str,
        extra_hashes: &BTreeMap<String, String>,
    ) -> bool {
        if !object.exists() {
            return false;
        }
        if self.last_build_hash != command_hash {
            return false;
        }
        if &self.extra_hashes != extra_hashes {
            return false;
        }
        self.per_file_fingerprints
            .get(source)
            .map(|fp| fp.matches(source))
            .unwrap_or(false)
    }

    /// The §4.6 seven-point up-to-date check for one compiled object:
    /// the object exists, the matching dependency file exists and names
    /// this source, every header the dependency file names still
    /// matches its recorded fingerprint, the source file's own
    /// fingerprint matches, and the toolchain/configuration/command-line
    /// fingerprints folded into `command_hash` are unchanged.
    pub fn object_up_to_date(
        &self,
        object: &Path,
        dependency_file: &Path,
        source: &Path,
        command_hash: &str,
        extra_hashes: &BTreeMap<String, String>,
    ) -> bool {
        if !object.exists() {
            return false;
        }
        if self.last_build_hash != command_hash {
            return false;
        }
        if &self.extra_hashes != extra_hashes {
            return false;
        }
        if !self
            .per_file_fingerprints
            .get(source)
            .map(|fp| fp.matches(source))
            .unwrap_or(false)
        {
            return false;
        }

        let Ok(dep_text) = std::fs::read_to_string(dependency_file) else {
            return false;
        };
        let headers = parse_makefile_deps(&dep_text);
        // A stale dependency file left over from a renamed source won't
        // list it among its own prerequisites.
        if !headers.iter().any(|h| h == source) {
            return false;
        }

        for header in &headers {
            match self.per_file_fingerprints.get(header) {
                Some(fp) if fp.matches(header) => {}
                _ => return false,
            }
        }

        true
    }

    pub fn record(
        &mut self,
        command_hash: &str,
        inputs: &[PathBuf],
        extra_hashes: BTreeMap<String, String>,
    ) {
        self.last_build_hash = command_hash.to_string();
        self.extra_hashes = extra_hashes;
        self.per_file_fingerprints.clear();
        for input in inputs {
            if let Ok(fp) = FileFingerprint::capture(input) {
                self.per_file_fingerprints.insert(input.clone(), fp);
            }
        }
    }
}

/// Parse a GNU-Makefile-syntax `.d` dependency file's header list
/// (everything after the first `:`, whitespace- and `\`-continuation-
/// separated).
pub(crate) fn parse_makefile_deps(text: &str) -> Vec<PathBuf> {
    let joined = text.replace("\\\n", " ");
    let Some((_, rest)) = joined.split_once(':') else {
        return Vec::new();
    };
    rest.split_whitespace().map(PathBuf::from).collect()
}

/// The full in-memory cache for one build invocation: loaded fully at
/// build start, mutated only on the driver thread, persisted atomically
/// at build end (§5 "Shared resources").
#[derive(Debug, Default)]
pub struct Cache {
    dir: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    dirty: std::collections::HashSet<String>,
}

impl Cache {
    /// Load every persisted entry from `dir` (missing or corrupt files
    /// are treated as "no entry yet", never a fatal error).
    pub fn load(dir: &Path) -> Self {
        let mut entries = BTreeMap::new();
        if let Ok(read_dir) = std::fs::read_dir(dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if let Ok(text) = std::fs::read_to_string(&path) {
                    if let Ok(cache_entry) = serde_json::from_str::<CacheEntry>(&text) {
                        entries.insert(stem.to_string(), cache_entry);
                    }
                }
            }
        }
        Cache {
            dir: dir.to_path_buf(),
            entries,
            dirty: Default::default(),
        }
    }

    /// The cache key for one target: target identity folded with the
    /// toolchain and configuration fingerprints (§3's "Cache entry" key).
    pub fn key(target_name: &str, toolchain_fingerprint: &str, configuration_fingerprint: &str) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(target_name)
            .update_str(toolchain_fingerprint)
            .update_str(configuration_fingerprint);
        fp.finish_short()
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn update(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key.clone(), entry);
        self.dirty.insert(key);
    }

    /// Persist every dirty entry atomically: write to a sibling temp
    /// file, then rename over the real one (§4.6).
    pub fn persist(&self) -> Result<(), BuildError> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| BuildError::CachePersistence {
            message: format!("failed to create cache directory: {e}"),
        })?;

        for key in &self.dirty {
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            let text = serde_json::to_string(entry).map_err(|e| BuildError::CachePersistence {
                message: format!("failed to serialize cache entry `{key}`: {e}"),
            })?;
            let final_path = self.dir.join(format!("{key}.json"));
            let tmp_path = self.dir.join(format!("{key}.json.tmp"));
            std::fs::write(&tmp_path, &text).map_err(|e| BuildError::CachePersistence {
                message: format!("failed to write cache entry `{key}`: {e}"),
            })?;
            std::fs::rename(&tmp_path, &final_path).map_err(|e| BuildError::CachePersistence {
                message: format!("failed to finalize cache entry `{key}`: {e}"),
            })?;
        }
        Ok(())
    }
}

/// Fold a target's build recipe (name, toolchain kind, and the flag
/// groups that apply uniformly across its compile units) into the
/// single `lastBuildHash` a target's cache entry is keyed on. Per-file
/// content changes are caught separately by `per_file_fingerprints`.
pub fn target_command_hash(parts: &[&str], flag_groups: &[&[String]]) -> String {
    let mut fp = Fingerprint::new();
    for part in parts {
        fp.update_str(part);
    }
    for group in flag_groups {
        fp.update_strs(group.iter().map(String::as_str));
    }
    fp.finish()
}

/// Hash the argv list of a synthesized command, for the "command-line
/// fingerprint matches" leg of the up-to-date check.
pub fn command_hash(program: &Path, args: &[String]) -> String {
    let mut fp = Fingerprint::new();
    fp.update_str(&program.display().to_string());
    fp.update_strs(args.iter().map(String::as_str));
    fp.finish()
}

/// Fold the schema text, flag-probe cache, and project description file
/// into one "extra hash" map (§4.6 "Extra-hash inputs"): any change to
/// any of them invalidates every cache entry regardless of per-file
/// fingerprints.
pub fn extra_hashes(project_description: &Path, schema_text: &str) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    hashes.insert(
        "schema".to_string(),
        crate::util::hash::sha256_str(schema_text),
    );
    if let Ok(hash) = sha256_file(project_description) {
        hashes.insert("projectDescription".to_string(), hash);
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_entry_is_never_up_to_date() {
        let entry = CacheEntry::default();
        let tmp = TempDir::new().unwrap();
        let object = tmp.path().join("main.o");
        std::fs::write(&object, "").unwrap();
        assert!(!entry.object_up_to_date(
            &object,
            &tmp.path().join("main.d"),
            &tmp.path().join("main.c"),
            "hash",
            &BTreeMap::new()
        ));
    }

    #[test]
    fn up_to_date_after_recording_matching_fingerprints() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("main.c");
        let header = tmp.path().join("main.h");
        std::fs::write(&source, "#include \"main.h\"").unwrap();
        std::fs::write(&header, "").unwrap();
        let object = tmp.path().join("main.o");
        std::fs::write(&object, "").unwrap();
        let dep = tmp.path().join("main.d");
        std::fs::write(&dep, format!("{}: {} {}", object.display(), source.display(), header.display())).unwrap();

        let mut entry = CacheEntry::default();
        entry.record("hash", &[source.clone(), header.clone()], BTreeMap::new());

        assert!(entry.object_up_to_date(&object, &dep, &source, "hash", &BTreeMap::new()));
    }

    #[test]
    fn touching_header_invalidates_entry() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("main.c");
        let header = tmp.path().join("main.h");
        std::fs::write(&source, "").unwrap();
        std::fs::write(&header, "v1").unwrap();
        let object = tmp.path().join("main.o");
        std::fs::write(&object, "").unwrap();
        let dep = tmp.path().join("main.d");
        std::fs::write(&dep, format!("{}: {} {}", object.display(), source.display(), header.display())).unwrap();

        let mut entry = CacheEntry::default();
        entry.record("hash", &[source.clone(), header.clone()], BTreeMap::new());
        assert!(entry.object_up_to_date(&object, &dep, &source, "hash", &BTreeMap::new()));

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&header, "v2 with more bytes").unwrap();
        assert!(!entry.object_up_to_date(&object, &dep, &source, "hash", &BTreeMap::new()));
    }

    #[test]
    fn changed_extra_hashes_invalidate_everything() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("main.c");
        std::fs::write(&source, "").unwrap();
        let object = tmp.path().join("main.o");
        std::fs::write(&object, "").unwrap();
        let dep = tmp.path().join("main.d");
        std::fs::write(&dep, format!("{}: {}", object.display(), source.display())).unwrap();

        let mut before = BTreeMap::new();
        before.insert("schema".to_string(), "abc".to_string());
        let mut entry = CacheEntry::default();
        entry.record("hash", &[source.clone()], before);

        let mut after = BTreeMap::new();
        after.insert("schema".to_string(), "def".to_string());
        assert!(!entry.object_up_to_date(&object, &dep, &source, "hash", &after));
    }

    #[test]
    fn persist_writes_atomically_via_rename() {
        let tmp = TempDir::new().unwrap();
        let mut cache = Cache::load(tmp.path());
        cache.update("abc123".to_string(), CacheEntry::default());
        cache.persist().unwrap();

        assert!(tmp.path().join("abc123.json").exists());
        assert!(!tmp.path().join("abc123.json.tmp").exists());

        let reloaded = Cache::load(tmp.path());
        assert!(reloaded.entry("abc123").is_some());
    }

    #[test]
    fn cache_key_changes_with_any_component() {
        let k1 = Cache::key("app", "tc1", "cfg1");
        let k2 = Cache::key("app", "tc2", "cfg1");
        let k3 = Cache::key("lib", "tc1", "cfg1");
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
    }
}
