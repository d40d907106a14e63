//! The build driver (§4.5, §5): picks the backend the resolved toolchain
//! calls for, wires up the incremental cache when a project description
//! path is available, and reports progress.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::backend;
use crate::builder::cache::{self, Cache};
use crate::builder::context::BuildContext;
use crate::builder::native::{BuiltArtifact, Cancellation, NativeScheduler};
use crate::builder::plan::BuildPlan;
use crate::core::abi::BuildStrategy;
use crate::core::error::BuildError;
use crate::core::schema;

/// Drives one build: resolves which backend strategy to use, attaches
/// the incremental cache for the native backend, and reports progress.
pub struct BuildExecutor<'a> {
    ctx: &'a BuildContext,
    verbose: bool,
    project_description: Option<PathBuf>,
    cancel: Option<Arc<Cancellation>>,
}

impl<'a> BuildExecutor<'a> {
    /// Create a new build executor.
    pub fn new(ctx: &'a BuildContext) -> Self {
        BuildExecutor {
            ctx,
            verbose: false,
            project_description: None,
            cancel: None,
        }
    }

    /// Enable verbose output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable the incremental cache for the native backend (no-op for
    /// the Makefile/Ninja backends, which rely on the external tool's
    /// own up-to-date tracking instead). `project_description` is folded
    /// into the cache's extra-hash inputs so any edit to it invalidates
    /// every entry (§4.6).
    pub fn with_project_description(mut self, project_description: impl Into<PathBuf>) -> Self {
        self.project_description = Some(project_description.into());
        self
    }

    /// Share a cancellation flag with the caller, e.g. one a signal
    /// handler installed by the embedding application sets on Ctrl-C.
    /// A fresh, never-requested one is used if none is supplied.
    pub fn with_cancellation(mut self, cancel: Arc<Cancellation>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Execute a build plan with progress reporting, returning one
    /// artifact per target.
    pub fn execute(&self, plan: &BuildPlan, jobs: Option<usize>) -> Result<Vec<BuiltArtifact>, BuildError> {
        let start = Instant::now();
        let compile_count: usize = plan.targets.iter().map(|t| t.compile_units.len()).sum();
        let link_count = plan.targets.len();

        if self.verbose {
            eprintln!("   Compiling {compile_count} file(s)");
            eprintln!("     Linking {link_count} target(s)");
        }

        let total = compile_count + link_count;
        let pb = if !self.verbose && total > 1 {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let artifacts = self.dispatch(plan, jobs)?;

        if let Some(pb) = pb {
            pb.finish_with_message("done");
        }

        let elapsed = start.elapsed();
        eprintln!(
            "    Finished {} target(s) in {:.2}s",
            artifacts.len(),
            elapsed.as_secs_f64()
        );

        Ok(artifacts)
    }

    fn dispatch(&self, plan: &BuildPlan, jobs: Option<usize>) -> Result<Vec<BuiltArtifact>, BuildError> {
        match self.ctx.resolved.descriptor.strategy {
            BuildStrategy::Native => {
                let cancel = self.cancel.clone().unwrap_or_else(Cancellation::new);
                let mut scheduler = NativeScheduler::new(self.ctx, jobs);
                if let Some(desc) = &self.project_description {
                    scheduler = scheduler.with_cache(
                        Arc::new(Mutex::new(Cache::load(&self.ctx.cache_dir()))),
                        self.ctx.toolchain_fingerprint(),
                        self.ctx.configuration_fingerprint(),
                        cache::extra_hashes(desc, schema::schema_text()),
                    );
                }
                scheduler.build(plan, &cancel)
            }
            strategy @ (BuildStrategy::Makefile | BuildStrategy::Ninja) => {
                backend::build(self.ctx, plan, strategy)
            }
        }
    }
}

/// Progress callback for build steps, independent of which backend is
/// driving the build — useful for an embedding application's own UI.
#[derive(Clone)]
pub struct BuildProgress {
    compiled: Arc<AtomicUsize>,
    linked: Arc<AtomicUsize>,
    total_compile: usize,
    total_link: usize,
}

impl BuildProgress {
    /// Create a new progress tracker.
    pub fn new(total_compile: usize, total_link: usize) -> Self {
        BuildProgress {
            compiled: Arc::new(AtomicUsize::new(0)),
            linked: Arc::new(AtomicUsize::new(0)),
            total_compile,
            total_link,
        }
    }

    /// Record a completed compilation.
    pub fn compiled(&self) {
        self.compiled.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a completed link.
    pub fn linked(&self) {
        self.linked.fetch_add(1, Ordering::SeqCst);
    }

    /// Get current compilation count.
    pub fn compile_count(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    /// Get current link count.
    pub fn link_count(&self) -> usize {
        self.linked.load(Ordering::SeqCst)
    }

    /// Get total progress as a fraction.
    pub fn progress(&self) -> f64 {
        let done = self.compile_count() + self.link_count();
        let total = self.total_compile + self.total_link;
        if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        }
    }

    /// Get total expected steps (compile + link).
    pub fn total(&self) -> usize {
        self.total_compile + self.total_link
    }

    /// Check if build is complete.
    pub fn is_complete(&self) -> bool {
        self.compile_count() >= self.total_compile && self.link_count() >= self.total_link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::resolve::SupportedFlags;
    use crate::builder::toolchain::{GccToolchain, ResolvedToolchain, ToolchainPlatform};
    use crate::core::abi::{Architecture, BuildPathStyle, ToolchainDescriptor, ToolchainType};
    use crate::core::configuration::BuildConfiguration;
    use crate::core::target::{Language, SourceTarget, Target, TargetDefinition, TargetKind, WarningPreset};
    use crate::core::workspace::Workspace;
    use crate::util::interning::InternedString;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn gcc_ctx(project_dir: PathBuf, strategy: BuildStrategy) -> BuildContext {
        let target = Target {
            name: InternedString::new("app"),
            definition: TargetDefinition::Source(SourceTarget {
                kind: TargetKind::ConsoleApplication,
                language: Language::Cxx,
                files: vec!["main.cpp".to_string()],
                exclude: vec![],
                include_dirs: vec![],
                defines: vec![],
                compiler_flags: vec![],
                linker_flags: vec![],
                libraries: vec![],
                links: vec![],
                project_static_links: vec![],
                precompiled_header: None,
                cpp_standard: None,
                warning_preset: WarningPreset::Minimal,
                thread_model: Default::default(),
                msvc_runtime: None,
                cpp_runtime: None,
                position_independent_code: None,
                run_configuration: None,
                conditions: Default::default(),
            }),
        };

        let workspace = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            vec![target],
            vec![],
            BTreeMap::new(),
            project_dir,
        )
        .unwrap();

        let toolchain = GccToolchain::new(
            PathBuf::from("true"),
            PathBuf::from("true"),
            PathBuf::from("true"),
            ToolchainPlatform::Gcc,
        );
        let resolved = ResolvedToolchain {
            toolchain: Box::new(toolchain),
            descriptor: ToolchainDescriptor {
                kind: ToolchainType::Gcc,
                compiler_c: PathBuf::from("true"),
                compiler_cpp: PathBuf::from("true"),
                compiler_rc: None,
                linker: PathBuf::from("true"),
                archiver: PathBuf::from("true"),
                profiler: None,
                strategy,
                build_path_style: BuildPathStyle::Gnu,
            },
            architecture: Architecture::host_native(),
            supported_flags: SupportedFlags::default(),
            compiler_version: String::new(),
        };

        BuildContext::new(workspace, BuildConfiguration::named("Debug"), resolved, "linux")
    }

    #[test]
    fn dispatches_to_native_scheduler_and_returns_one_artifact_per_target() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("main.cpp"), "int main(){}").unwrap();

        let ctx = gcc_ctx(tmp.path().to_path_buf(), BuildStrategy::Native);
        let plan = BuildPlan::synthesize(&ctx).unwrap();

        let executor = BuildExecutor::new(&ctx).verbose(true);
        let artifacts = executor.execute(&plan, Some(1)).unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn native_dispatch_with_project_description_persists_a_cache_entry() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("main.cpp"), "int main(){}").unwrap();
        let description = tmp.path().join("project.json");
        std::fs::write(&description, r#"{"version":"1.0","workspace":"demo","targets":{}}"#).unwrap();

        let ctx = gcc_ctx(tmp.path().to_path_buf(), BuildStrategy::Native);
        let plan = BuildPlan::synthesize(&ctx).unwrap();

        let executor = BuildExecutor::new(&ctx).with_project_description(&description);
        executor.execute(&plan, Some(1)).unwrap();

        assert!(ctx.cache_dir().exists());
    }

    #[test]
    fn test_build_progress_new() {
        let progress = BuildProgress::new(10, 2);
        assert_eq!(progress.compile_count(), 0);
        assert_eq!(progress.link_count(), 0);
        assert_eq!(progress.total(), 12);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_build_progress_compiled() {
        let progress = BuildProgress::new(3, 1);
        assert_eq!(progress.compile_count(), 0);

        progress.compiled();
        assert_eq!(progress.compile_count(), 1);

        progress.compiled();
        progress.compiled();
        assert_eq!(progress.compile_count(), 3);
    }

    #[test]
    fn test_build_progress_linked() {
        let progress = BuildProgress::new(2, 3);
        assert_eq!(progress.link_count(), 0);

        progress.linked();
        assert_eq!(progress.link_count(), 1);

        progress.linked();
        progress.linked();
        assert_eq!(progress.link_count(), 3);
    }

    #[test]
    fn test_build_progress_progress_fraction() {
        let progress = BuildProgress::new(4, 1);
        assert_eq!(progress.progress(), 0.0);

        progress.compiled();
        assert!((progress.progress() - 0.2).abs() < 0.001);

        progress.compiled();
        progress.compiled();
        progress.compiled();
        assert!((progress.progress() - 0.8).abs() < 0.001);

        progress.linked();
        assert!((progress.progress() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_build_progress_empty() {
        let progress = BuildProgress::new(0, 0);
        assert_eq!(progress.progress(), 1.0);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_build_progress_is_complete() {
        let progress = BuildProgress::new(2, 1);
        assert!(!progress.is_complete());

        progress.compiled();
        progress.compiled();
        assert!(!progress.is_complete());

        progress.linked();
        assert!(progress.is_complete());
    }

    #[test]
    fn test_build_progress_thread_safe() {
        use std::thread;

        let progress = BuildProgress::new(100, 10);
        let progress_clone = progress.clone();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let p = progress.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        p.compiled();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(progress_clone.compile_count(), 100);
    }

    #[test]
    fn test_build_progress_clone() {
        let progress = BuildProgress::new(5, 2);
        let cloned = progress.clone();

        progress.compiled();
        progress.compiled();
        progress.linked();

        // Cloned instance shares the same atomic counters
        assert_eq!(cloned.compile_count(), 2);
        assert_eq!(cloned.link_count(), 1);
    }
}
