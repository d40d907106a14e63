//! The command synthesizer (§4.4): given a source group, a target, the
//! active configuration, and a resolved toolchain, produce the concrete
//! argv list for every compile, and the argv list for the target's own
//! link or archive step.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::builder::context::BuildContext;
use crate::builder::discovery::{self, DiscoveredSource, SourceGroup};
use crate::builder::toolchain::{ArchiveInput, CompileInput, LinkInput, PchUse, ResourceInput};
use crate::builder::warnings;
use crate::core::target::{Language, SourceTarget, TargetKind};
use crate::util::interning::InternedString;

/// One file this target needs compiled, with the toolchain-agnostic
/// input the caller turns into an actual `CommandSpec` via
/// `Toolchain::compile_command`.
pub struct CompileUnit {
    pub discovered: DiscoveredSource,
    pub language: Language,
    pub is_resource: bool,
    pub input: CompileInput,
}

/// The complete synthesized plan for one `source` target: every compile
/// unit in compile order, plus (for non-library-header-only targets) the
/// archive or link input for the target's own output.
pub struct TargetPlan {
    pub name: InternedString,
    pub kind: TargetKind,
    pub output: PathBuf,
    pub missing_sources: Vec<String>,
    pub pch_object: Option<PathBuf>,
    pub compile_units: Vec<CompileUnit>,
    pub archive: Option<ArchiveInput>,
    pub link: Option<LinkInput>,
}

/// Platform-appropriate prefix/suffix for a target's output file name
/// (§6 "Output artifacts").
pub fn output_file_name(ctx: &BuildContext, name: &str, kind: TargetKind) -> String {
    let tc = ctx.toolchain();
    match kind {
        TargetKind::ConsoleApplication | TargetKind::DesktopApplication => {
            let ext = tc.exe_extension();
            if ext.is_empty() {
                name.to_string()
            } else {
                format!("{name}.{ext}")
            }
        }
        TargetKind::SharedLibrary => {
            format!("{}{}.{}", tc.shared_lib_prefix(), name, tc.shared_lib_extension())
        }
        TargetKind::StaticLibrary => {
            format!("{}{}-s.{}", tc.static_lib_prefix(), name, tc.static_lib_extension())
        }
    }
}

fn source_language(path: &str, default: Language) -> (Language, bool) {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "c" => (Language::C, false),
        "cpp" | "cc" | "cxx" | "c++" => (Language::Cxx, false),
        "rc" => (default, true),
        _ => (default, false),
    }
}

fn parse_defines(defines: &[String]) -> Vec<(String, Option<String>)> {
    defines
        .iter()
        .map(|d| match d.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (d.clone(), None),
        })
        .collect()
}

/// Build the full synthesized plan for one `source` target.
///
/// Fails with `SemanticValidation` if source discovery turned up two
/// files whose logical path collides once case is folded (§8: "a source
/// file whose name differs only in case on a case-insensitive
/// filesystem"), since both would alias the same object path there.
pub fn plan_source_target(
    ctx: &BuildContext,
    name: InternedString,
    target: &SourceTarget,
) -> Result<TargetPlan, crate::core::error::BuildError> {
    let source_root = ctx.project_dir().to_path_buf();
    let group: SourceGroup = discovery::discover(target, &source_root);
    if let Some((first, second)) = group.case_collisions.first() {
        return Err(crate::core::error::BuildError::SemanticValidation {
            message: format!(
                "target `{name}`: source files `{first}` and `{second}` collide on a \
                 case-insensitive filesystem"
            ),
        });
    }
    if group.sources.iter().all(|s| s.is_pch) {
        return Err(crate::core::error::BuildError::SemanticValidation {
            message: format!("target `{name}`: resolved to an empty set of source files"),
        });
    }
    let build_out = ctx.build_out();
    let object_ext = ctx.toolchain().object_extension();

    let include_dirs: Vec<PathBuf> = target.include_dirs.iter().map(PathBuf::from).collect();
    let defines = parse_defines(&target.defines);
    let warning_flags = warnings_for(ctx, target);
    let optimization_flags = ctx.optimization_flags();
    let debug_flags = ctx.debug_flags();
    let arch_flags = ctx.architecture().extra_options.clone();

    let pch_object = target.precompiled_header.as_ref().map(|_| {
        build_out
            .join("pch")
            .join(format!("{}.{}", name, ctx.toolchain().pch_extension()))
    });

    let mut compile_units = Vec::with_capacity(group.sources.len());

    for source in &group.sources {
        let (language, is_resource) = source_language(&source.logical, target.language);

        let object = source.object_path(&build_out, object_ext);
        let dependency = if is_resource {
            None
        } else {
            Some(source.dependency_path(&build_out))
        };

        let pch = if source.is_pch {
            None
        } else {
            pch_object.as_ref().map(|pch_file| PchUse {
                header: source_root.join(target.precompiled_header.as_deref().unwrap_or_default()),
                pch_file: pch_file.clone(),
            })
        };

        let output = if source.is_pch {
            pch_object.clone().unwrap_or(object.clone())
        } else {
            object.clone()
        };

        let input = CompileInput {
            source: source.absolute.clone(),
            output,
            include_dirs: include_dirs.clone(),
            defines: defines.clone(),
            cflags: target.compiler_flags.clone(),
            warning_flags: warning_flags.clone(),
            optimization_flags: optimization_flags.clone(),
            debug_flags: debug_flags.clone(),
            lto: ctx.configuration.link_time_optimization,
            arch_flags: arch_flags.clone(),
            sysroot_flags: Vec::new(),
            pch,
            diagnostics_color: true,
            dependency_output: dependency,
        };

        compile_units.push(CompileUnit {
            discovered: source.clone(),
            language,
            is_resource,
            input,
        });
    }

    let output_name = output_file_name(ctx, name.as_str(), target.kind);
    let output = build_out.join(&output_name);

    let object_outputs: Vec<PathBuf> = compile_units
        .iter()
        .filter(|u| !u.discovered.is_pch && !u.is_resource)
        .map(|u| u.input.output.clone())
        .collect();
    let resource_outputs: Vec<PathBuf> = compile_units
        .iter()
        .filter(|u| u.is_resource)
        .map(|u| u.input.output.clone())
        .collect();
    let mut all_objects = object_outputs;
    all_objects.extend(resource_outputs);

    let (archive, link) = match target.kind {
        TargetKind::StaticLibrary => (
            Some(ArchiveInput {
                objects: all_objects,
                output: output.clone(),
            }),
            None,
        ),
        _ => (
            None,
            Some(build_link_input(ctx, target, all_objects, output.clone())),
        ),
    };

    Ok(TargetPlan {
        name,
        kind: target.kind,
        output,
        missing_sources: group.missing,
        pch_object,
        compile_units,
        archive,
        link,
    })
}

fn warnings_for(ctx: &BuildContext, target: &SourceTarget) -> Vec<String> {
    if ctx.toolchain().platform().is_gcc_like() {
        warnings::gcc_flags(target.warning_preset)
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        warnings::msvc_flags(target.warning_preset)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// Detect whether `target`'s `projectStaticLinks` participate in a cycle
/// among sibling source targets (§8 boundary behavior), by checking
/// whether any of them (transitively) links back to `target` itself.
pub fn has_cyclic_static_links(
    workspace: &crate::core::workspace::Workspace,
    target_name: InternedString,
) -> bool {
    fn reaches(
        ws: &crate::core::workspace::Workspace,
        from: InternedString,
        goal: InternedString,
        visited: &mut HashSet<InternedString>,
    ) -> bool {
        if !visited.insert(from) {
            return false;
        }
        let Some(t) = ws.target(from.as_str()) else {
            return false;
        };
        let Some(source) = t.as_source() else {
            return false;
        };
        for dep in &source.project_static_links {
            if *dep == goal || reaches(ws, *dep, goal, visited) {
                return true;
            }
        }
        false
    }

    let Some(target) = workspace.target(target_name.as_str()) else {
        return false;
    };
    let Some(source) = target.as_source() else {
        return false;
    };
    for dep in &source.project_static_links {
        let mut visited = HashSet::new();
        if reaches(workspace, *dep, target_name, &mut visited) {
            return true;
        }
    }
    false
}

fn build_link_input(
    ctx: &BuildContext,
    target: &SourceTarget,
    objects: Vec<PathBuf>,
    output: PathBuf,
) -> LinkInput {
    let lib_dirs = target
        .libraries
        .iter()
        .filter_map(|l| PathBuf::from(l).parent().map(Path::to_path_buf))
        .collect();

    LinkInput {
        objects,
        output,
        lib_dirs,
        dynamic_libs: target.links.iter().map(|n| n.as_str().to_string()).collect(),
        static_libs: target
            .project_static_links
            .iter()
            .map(|n| n.as_str().to_string())
            .collect(),
        cyclic_static_libs: false,
        ldflags: target.linker_flags.clone(),
        lto: ctx.configuration.link_time_optimization,
        suppress_default_libs: false,
        is_debug: ctx.is_debug(),
    }
}

/// Synthesize the `ResourceInput` for a `.rc` compile unit.
pub fn resource_input(unit: &CompileUnit) -> ResourceInput {
    ResourceInput {
        source: unit.input.source.clone(),
        output: unit.input.output.clone(),
        include_dirs: unit.input.include_dirs.clone(),
        defines: unit.input.defines.clone(),
    }
}

/// The whole-workspace plan: one `TargetPlan` per `source` target, in
/// the workspace's topological link order so dependents are always
/// planned after their dependencies.
pub struct BuildPlan {
    pub targets: Vec<TargetPlan>,
}

impl BuildPlan {
    pub fn synthesize(ctx: &BuildContext) -> Result<BuildPlan, crate::core::error::BuildError> {
        let order = ctx
            .workspace
            .topological_target_order(&ctx.configuration.name, &ctx.platform)?;
        let mut targets = Vec::new();
        for name in order {
            let Some(target) = ctx.workspace.target(name.as_str()) else {
                continue;
            };
            if let Some(source) = target.as_source() {
                let mut plan = plan_source_target(ctx, name, source)?;
                if let Some(link) = plan.link.as_mut() {
                    link.cyclic_static_libs = has_cyclic_static_links(&ctx.workspace, name);
                }
                targets.push(plan);
            }
        }
        Ok(BuildPlan { targets })
    }
}
