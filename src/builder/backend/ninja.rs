//! Ninja build-file emission (§4.5 strategy 2).

use std::fmt::Write as _;

use crate::builder::context::BuildContext;
use crate::builder::plan::{resource_input, BuildPlan, CompileUnit, TargetPlan};
use crate::builder::toolchain::{CommandSpec, Toolchain};
use crate::core::target::{Language, TargetKind};

/// Render a `build.ninja` file for `plan`. Every command is baked into
/// its own `build` statement's `command =` binding rather than routed
/// through shared `rule` templates, since the per-file flag set already
/// varies (PCH use, per-file language, resource vs. compile) in ways a
/// small set of rules can't cleanly parameterize.
pub fn emit(ctx: &BuildContext, plan: &BuildPlan) -> String {
    let mut out = String::new();
    writeln!(out, "# Generated build file. Do not edit by hand.").unwrap();
    writeln!(out, "rule cmd\n  command = $cmd\n  description = $desc\n").unwrap();
    writeln!(out, "rule cmd_dep\n  command = $cmd\n  description = $desc\n  depfile = $depfile\n  deps = gcc\n").unwrap();

    let mut default_outputs = Vec::new();

    for target in &plan.targets {
        emit_target(ctx, &mut out, target);
        default_outputs.push(ninja_path(&target.output));
    }

    writeln!(out, "default {}", default_outputs.join(" ")).unwrap();
    out
}

fn emit_target(ctx: &BuildContext, out: &mut String, target: &TargetPlan) {
    let mut object_outputs = Vec::new();

    for unit in &target.compile_units {
        object_outputs.push(ninja_path(&unit.input.output));
        emit_compile_edge(ctx, out, unit);
    }

    let output = ninja_path(&target.output);

    if let Some(archive) = &target.archive {
        let spec = ctx.toolchain().archive_command(archive);
        writeln!(
            out,
            "build {output}: cmd {}\n  cmd = {}\n  desc = AR {output}\n",
            object_outputs.join(" "),
            escape(&spec.display())
        )
        .unwrap();
    } else if let Some(link) = &target.link {
        let driver = Language::Cxx;
        let cxx_opts = ctx.cxx_options(None, None);
        let spec = if target.kind == TargetKind::SharedLibrary {
            ctx.toolchain().link_shared_command(link, driver, Some(&cxx_opts))
        } else {
            ctx.toolchain().link_exe_command(link, driver, Some(&cxx_opts))
        };
        writeln!(
            out,
            "build {output}: cmd {}\n  cmd = {}\n  desc = LINK {output}\n",
            object_outputs.join(" "),
            escape(&spec.display())
        )
        .unwrap();
    }
}

fn emit_compile_edge(ctx: &BuildContext, out: &mut String, unit: &CompileUnit) {
    let object = ninja_path(&unit.input.output);
    let source = ninja_path(&unit.discovered.absolute);

    let spec: CommandSpec = if unit.is_resource {
        let input = resource_input(unit);
        match ctx.toolchain().resource_command(&input) {
            Some(spec) => spec,
            None => return,
        }
    } else {
        let cxx_opts = ctx.cxx_options(None, None);
        let cxx_opts = (unit.language == Language::Cxx).then_some(&cxx_opts);
        ctx.toolchain().compile_command(&unit.input, unit.language, cxx_opts)
    };

    match &unit.input.dependency_output {
        Some(dep) if !unit.is_resource => {
            writeln!(
                out,
                "build {object}: cmd_dep {source}\n  cmd = {}\n  desc = CXX {object}\n  depfile = {}\n",
                escape(&spec.display()),
                ninja_path(dep)
            )
            .unwrap();
        }
        _ => {
            writeln!(
                out,
                "build {object}: cmd {source}\n  cmd = {}\n  desc = CXX {object}\n",
                escape(&spec.display())
            )
            .unwrap();
        }
    }
}

fn ninja_path(path: &std::path::Path) -> String {
    path.display().to_string().replace(' ', "$ ").replace(':', "$:")
}

fn escape(command: &str) -> String {
    command.replace('$', "$$")
}
