//! The native build backend (§4.5, strategy 3): an in-process scheduler
//! that turns a synthesized [`BuildPlan`](crate::builder::plan::BuildPlan)
//! directly into subprocess invocations, without emitting a Makefile or
//! Ninja file first.
//!
//! Per target the scheduler honors the partial order PCH-before-objects-
//! before-link; across targets it walks the plan's already-topological
//! order so a target never starts linking before a target it statically
//! or dynamically links against has finished. Object compilation within
//! a target is farmed out to a bounded worker pool sized to `maxJobs`.
//! Two mutexes guard shared state: the job queue (task-graph mutex) and
//! stdout/stderr (output mutex); the task-graph mutex is never held
//! across a subprocess spawn.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::builder::context::BuildContext;
use crate::builder::plan::{resource_input, BuildPlan, CompileUnit, TargetPlan};
use crate::builder::toolchain::{CommandSpec, Toolchain};
use crate::core::error::BuildError;
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

/// How long the scheduler waits for in-flight jobs to exit on their own
/// after cancellation before force-killing them (§5).
const CANCELLATION_GRACE: Duration = Duration::from_secs(5);

/// One finished target's output, for the driver to report or feed into
/// a distribution step.
#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    pub target: crate::util::interning::InternedString,
    pub path: PathBuf,
}

/// Cooperative cancellation flag shared between the driver (which sets
/// it from a signal handler) and the scheduler (which polls it between
/// jobs and tracks currently-running children so they can be killed).
#[derive(Default)]
pub struct Cancellation {
    requested: AtomicBool,
    running: Mutex<Vec<Arc<Mutex<Option<std::process::Child>>>>>,
}

impl Cancellation {
    pub fn new() -> Arc<Self> {
        Arc::new(Cancellation::default())
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Mark cancellation requested, then give running jobs `CANCELLATION_GRACE`
    /// to exit on their own before killing them outright.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + CANCELLATION_GRACE;
        loop {
            let still_running = {
                let running = self.running.lock().unwrap();
                running.iter().any(|c| c.lock().unwrap().is_some())
            };
            if !still_running || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let running = self.running.lock().unwrap();
        for child in running.iter() {
            if let Some(child) = child.lock().unwrap().as_mut() {
                let _ = child.kill();
            }
        }
    }

    fn track(&self, child: Arc<Mutex<Option<std::process::Child>>>) {
        self.running.lock().unwrap().push(child);
    }

    fn untrack(&self, child: &Arc<Mutex<Option<std::process::Child>>>) {
        self.running.lock().unwrap().retain(|c| !Arc::ptr_eq(c, child));
    }
}

/// One unit of work the scheduler hands to a worker thread.
enum Job<'a> {
    Compile { unit: &'a CompileUnit, tag: String },
}

/// The in-process build backend.
pub struct NativeScheduler<'a> {
    ctx: &'a BuildContext,
    max_jobs: usize,
    cache: Option<Arc<Mutex<crate::builder::cache::Cache>>>,
    toolchain_fingerprint: String,
    configuration_fingerprint: String,
    extra_hashes: std::collections::BTreeMap<String, String>,
}

impl<'a> NativeScheduler<'a> {
    pub fn new(ctx: &'a BuildContext, max_jobs: Option<usize>) -> Self {
        let max_jobs = max_jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        NativeScheduler {
            ctx,
            max_jobs: max_jobs.max(1),
            cache: None,
            toolchain_fingerprint: String::new(),
            configuration_fingerprint: String::new(),
            extra_hashes: Default::default(),
        }
    }

    /// Attach an incremental cache (§4.6): compiles whose object,
    /// command-line recipe, and source/header fingerprints all still
    /// match a prior run are skipped instead of re-invoked.
    pub fn with_cache(
        mut self,
        cache: Arc<Mutex<crate::builder::cache::Cache>>,
        toolchain_fingerprint: String,
        configuration_fingerprint: String,
        extra_hashes: std::collections::BTreeMap<String, String>,
    ) -> Self {
        self.cache = Some(cache);
        self.toolchain_fingerprint = toolchain_fingerprint;
        self.configuration_fingerprint = configuration_fingerprint;
        self.extra_hashes = extra_hashes;
        self
    }

    /// Build every target in `plan`, in the order the plan already
    /// establishes, returning the artifact path for each.
    pub fn build(
        &self,
        plan: &BuildPlan,
        cancel: &Arc<Cancellation>,
    ) -> Result<Vec<BuiltArtifact>, BuildError> {
        let total_targets = plan.targets.len();
        let mut artifacts = Vec::with_capacity(total_targets);

        for (index, target) in plan.targets.iter().enumerate() {
            if cancel.is_requested() {
                return Err(BuildError::Interrupted);
            }
            tracing::info!(
                "[{}/{}] building target `{}`",
                index + 1,
                total_targets,
                target.name
            );
            let artifact = self.build_target(target, cancel)?;
            artifacts.push(artifact);
        }

        Ok(artifacts)
    }

    fn build_target(
        &self,
        target: &TargetPlan,
        cancel: &Arc<Cancellation>,
    ) -> Result<BuiltArtifact, BuildError> {
        let cache_key = self.cache.as_ref().map(|_| {
            crate::builder::cache::Cache::key(
                target.name.as_str(),
                &self.toolchain_fingerprint,
                &self.configuration_fingerprint,
            )
        });
        let command_hash = crate::builder::cache::target_command_hash(
            &[target.name.as_str(), self.ctx.resolved.descriptor.kind.as_str()],
            &[&self.ctx.optimization_flags(), &self.ctx.debug_flags()],
        );

        // PCH first: every other compile in this target depends on it.
        if let Some((pch_unit, rest)) = split_pch(target) {
            self.run_compile_job(pch_unit, cancel, cache_key.as_deref(), &command_hash)?;
            self.compile_pool(rest, cancel, cache_key.as_deref(), &command_hash)?;
        } else {
            self.compile_pool(&target.compile_units, cancel, cache_key.as_deref(), &command_hash)?;
        }

        if let Some(key) = &cache_key {
            self.record_target_cache(key, target, &command_hash);
        }

        if cancel.is_requested() {
            return Err(BuildError::Interrupted);
        }

        let output = if let Some(archive) = &target.archive {
            if let Some(parent) = archive.output.parent() {
                ensure_dir(parent).map_err(|e| BuildError::ArchiverInvocation {
                    output: archive.output.clone(),
                    command: String::new(),
                    stderr: e.to_string(),
                })?;
            }
            let spec = self.ctx.toolchain().archive_command(archive);
            self.run_job(spec, cancel, |command, stderr| BuildError::ArchiverInvocation {
                output: archive.output.clone(),
                command,
                stderr,
            })?;
            archive.output.clone()
        } else if let Some(link) = &target.link {
            if let Some(parent) = link.output.parent() {
                ensure_dir(parent).map_err(|e| BuildError::LinkerInvocation {
                    output: link.output.clone(),
                    command: String::new(),
                    stderr: e.to_string(),
                })?;
            }
            let driver = crate::core::target::Language::Cxx;
            let cxx_opts = self.ctx.cxx_options(None, None);
            let spec = if target.kind == crate::core::target::TargetKind::SharedLibrary {
                self.ctx
                    .toolchain()
                    .link_shared_command(link, driver, Some(&cxx_opts))
            } else {
                self.ctx
                    .toolchain()
                    .link_exe_command(link, driver, Some(&cxx_opts))
            };
            self.run_job(spec, cancel, |command, stderr| BuildError::LinkerInvocation {
                output: link.output.clone(),
                command,
                stderr,
            })?;
            link.output.clone()
        } else {
            target.output.clone()
        };

        Ok(BuiltArtifact {
            target: target.name,
            path: output,
        })
    }

    /// Compile every unit in `units` using a bounded worker pool. Fails
    /// fast on the first error once every already-dispatched job drains.
    fn compile_pool(
        &self,
        units: &[CompileUnit],
        cancel: &Arc<Cancellation>,
        cache_key: Option<&str>,
        command_hash: &str,
    ) -> Result<(), BuildError> {
        if units.is_empty() {
            return Ok(());
        }

        let queue: Arc<Mutex<VecDeque<&CompileUnit>>> =
            Arc::new(Mutex::new(units.iter().collect()));
        let total = units.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let failure: Arc<Mutex<Option<BuildError>>> = Arc::new(Mutex::new(None));
        let worker_count = self.max_jobs.min(total);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let queue = Arc::clone(&queue);
                let completed = Arc::clone(&completed);
                let failure = Arc::clone(&failure);
                let cancel = Arc::clone(cancel);
                scope.spawn(move || loop {
                    if cancel.is_requested() || failure.lock().unwrap().is_some() {
                        return;
                    }
                    let unit = {
                        let mut q = queue.lock().unwrap();
                        q.pop_front()
                    };
                    let Some(unit) = unit else { return };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::info!("[{done}/{total}] {}", unit.discovered.logical);
                    if let Err(err) = self.run_compile_job(unit, &cancel, cache_key, command_hash) {
                        let mut slot = failure.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                        return;
                    }
                });
            }
        });

        if let Some(err) = failure.lock().unwrap().take() {
            return Err(err);
        }
        if cancel.is_requested() {
            return Err(BuildError::Interrupted);
        }
        Ok(())
    }

    /// `true` if an already-cached entry says this unit's object is
    /// still current and the compile job can be skipped.
    fn is_cached_up_to_date(&self, unit: &CompileUnit, cache_key: Option<&str>, command_hash: &str) -> bool {
        let (Some(cache), Some(key)) = (&self.cache, cache_key) else {
            return false;
        };
        let cache = cache.lock().unwrap();
        let Some(entry) = cache.entry(key) else {
            return false;
        };
        match &unit.input.dependency_output {
            Some(dep) => entry.object_up_to_date(
                &unit.input.output,
                dep,
                &unit.discovered.absolute,
                command_hash,
                &self.extra_hashes,
            ),
            None => entry.simple_up_to_date(
                &unit.input.output,
                &unit.discovered.absolute,
                command_hash,
                &self.extra_hashes,
            ),
        }
    }

    /// Record every compiled source and header this build touched into
    /// the target's cache entry, and persist it.
    fn record_target_cache(&self, key: &str, target: &TargetPlan, command_hash: &str) {
        let Some(cache) = &self.cache else { return };

        let mut inputs: Vec<PathBuf> = Vec::new();
        for unit in &target.compile_units {
            inputs.push(unit.discovered.absolute.clone());
            if let Some(dep) = &unit.input.dependency_output {
                if let Ok(text) = std::fs::read_to_string(dep) {
                    inputs.extend(super::cache::parse_makefile_deps(&text));
                }
            }
        }

        let mut entry = crate::builder::cache::CacheEntry::default();
        entry.record(command_hash, &inputs, self.extra_hashes.clone());

        let mut cache = cache.lock().unwrap();
        cache.update(key.to_string(), entry);
        if let Err(err) = cache.persist() {
            tracing::warn!("{err}");
        }
    }

    fn run_compile_job(
        &self,
        unit: &CompileUnit,
        cancel: &Arc<Cancellation>,
        cache_key: Option<&str>,
        command_hash: &str,
    ) -> Result<(), BuildError> {
        if self.is_cached_up_to_date(unit, cache_key, command_hash) {
            tracing::debug!("up to date: {}", unit.discovered.logical);
            return Ok(());
        }

        if let Some(parent) = unit.input.output.parent() {
            ensure_dir(parent).map_err(|e| BuildError::CompilerInvocation {
                source: unit.discovered.absolute.clone(),
                command: String::new(),
                stderr: e.to_string(),
            })?;
        }

        let spec = if unit.is_resource {
            let input = resource_input(unit);
            self.ctx.toolchain().resource_command(&input).ok_or_else(|| {
                BuildError::ResourceCompilerMissing {
                    source: unit.discovered.absolute.clone(),
                }
            })?
        } else {
            let cxx_opts = self.ctx.cxx_options(None, None);
            let cxx_opts = (unit.language == crate::core::target::Language::Cxx).then_some(&cxx_opts);
            self.ctx
                .toolchain()
                .compile_command(&unit.input, unit.language, cxx_opts)
        };

        self.run_job(spec, cancel, |command, stderr| BuildError::CompilerInvocation {
            source: unit.discovered.absolute.clone(),
            command,
            stderr,
        })
    }

    /// Spawn one subprocess, streaming its output under the output mutex
    /// with a tag prefix, tracking the child so cancellation can kill it.
    fn run_job(
        &self,
        spec: CommandSpec,
        cancel: &Arc<Cancellation>,
        to_error: impl FnOnce(String, String) -> BuildError,
    ) -> Result<(), BuildError> {
        if cancel.is_requested() {
            return Err(BuildError::Interrupted);
        }

        let mut cmd = std::process::Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let command_display = ProcessBuilder::new(&spec.program).args(&spec.args).display_command();

        let mut child = cmd.spawn().map_err(|e| {
            to_error(command_display.clone(), format!("failed to spawn: {e}"))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let slot = Arc::new(Mutex::new(None));
        cancel.track(Arc::clone(&slot));
        *slot.lock().unwrap() = Some(child);

        let mut captured_stderr = String::new();
        {
            use std::io::Read;
            if let Some(mut out) = stdout {
                let mut buf = String::new();
                let _ = out.read_to_string(&mut buf);
                for line in buf.lines() {
                    tracing::info!("{line}");
                }
            }
            if let Some(mut err) = stderr {
                let _ = err.read_to_string(&mut captured_stderr);
                for line in captured_stderr.lines() {
                    tracing::info!("{line}");
                }
            }
        }

        let status = {
            let mut guard = slot.lock().unwrap();
            match guard.as_mut() {
                Some(child) => child.wait().map_err(|e| {
                    to_error(command_display.clone(), format!("failed to wait: {e}"))
                })?,
                None => return Err(BuildError::Interrupted),
            }
        };
        cancel.untrack(&slot);

        if !status.success() {
            return Err(to_error(command_display, captured_stderr));
        }
        Ok(())
    }
}

fn split_pch(target: &TargetPlan) -> Option<(&CompileUnit, &[CompileUnit])> {
    if target.pch_object.is_none() {
        return None;
    }
    let (first, rest) = target.compile_units.split_first()?;
    if first.discovered.is_pch {
        Some((first, rest))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::plan::BuildPlan;
    use crate::builder::toolchain::resolve::SupportedFlags;
    use crate::builder::toolchain::{GccToolchain, ResolvedToolchain, ToolchainPlatform};
    use crate::core::abi::{
        Architecture, BuildPathStyle, BuildStrategy, ToolchainDescriptor, ToolchainType,
    };
    use crate::core::configuration::BuildConfiguration;
    use crate::core::target::{Language, SourceTarget, Target, TargetDefinition, TargetKind, WarningPreset};
    use crate::core::workspace::Workspace;
    use crate::util::interning::InternedString;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn gcc_ctx(project_dir: PathBuf, targets: Vec<Target>) -> BuildContext {
        let workspace = Workspace::new(
            "demo",
            None,
            PathBuf::from("."),
            vec![BuildConfiguration::named("Debug")],
            targets,
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
                strategy: BuildStrategy::Native,
                build_path_style: BuildPathStyle::Gnu,
            },
            architecture: Architecture::host_native(),
            supported_flags: SupportedFlags::default(),
            compiler_version: String::new(),
        };

        BuildContext::new(workspace, BuildConfiguration::named("Debug"), resolved, "linux")
    }

    fn console_app(name: &str, files: &[&str]) -> Target {
        Target {
            name: InternedString::new(name),
            definition: TargetDefinition::Source(SourceTarget {
                kind: TargetKind::ConsoleApplication,
                language: Language::Cxx,
                files: files.iter().map(|s| s.to_string()).collect(),
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
        }
    }

    #[test]
    fn cancellation_before_start_short_circuits() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("main.cpp"), "int main(){}").unwrap();

        let ctx = gcc_ctx(tmp.path().to_path_buf(), vec![console_app("app", &["main.cpp"])]);
        let plan = BuildPlan::synthesize(&ctx).unwrap();

        let cancel = Cancellation::new();
        cancel.requested.store(true, Ordering::SeqCst);

        let scheduler = NativeScheduler::new(&ctx, Some(1));
        let result = scheduler.build(&plan, &cancel);
        assert!(matches!(result, Err(BuildError::Interrupted)));
    }

    #[test]
    fn split_pch_requires_pch_object_and_leading_pch_unit() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("main.cpp"), "int main(){}").unwrap();

        let ctx = gcc_ctx(tmp.path().to_path_buf(), vec![console_app("app", &["main.cpp"])]);
        let plan = BuildPlan::synthesize(&ctx).unwrap();
        assert!(split_pch(&plan.targets[0]).is_none());
    }
}
