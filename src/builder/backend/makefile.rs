//! GNU Makefile / NMake emission (§4.5 strategy 1).

use std::fmt::Write as _;

use crate::builder::context::BuildContext;
use crate::builder::plan::{resource_input, BuildPlan, CompileUnit, TargetPlan};
use crate::builder::toolchain::{CommandSpec, Toolchain};
use crate::core::target::{Language, TargetKind};

/// Render a full Makefile (or, when `nmake` is set, an NMake-compatible
/// description file) for `plan`.
pub fn emit(ctx: &BuildContext, plan: &BuildPlan, nmake: bool) -> String {
    let mut out = String::new();
    writeln!(out, "# Generated build file. Do not edit by hand.").unwrap();

    let all_outputs: Vec<String> = plan
        .targets
        .iter()
        .map(|t| quote_path(&t.output))
        .collect();
    if nmake {
        writeln!(out, "all: {}\n", all_outputs.join(" ")).unwrap();
    } else {
        writeln!(out, ".PHONY: all\nall: {}\n", all_outputs.join(" ")).unwrap();
    }

    for target in &plan.targets {
        emit_target(ctx, &mut out, target, nmake);
    }

    out
}

fn emit_target(ctx: &BuildContext, out: &mut String, target: &TargetPlan, nmake: bool) {
    let mut object_outputs = Vec::new();

    for unit in &target.compile_units {
        let object = quote_path(&unit.input.output);
        object_outputs.push(object.clone());
        emit_compile_rule(ctx, out, unit, nmake);
    }

    let output = quote_path(&target.output);

    if let Some(archive) = &target.archive {
        let spec = ctx.toolchain().archive_command(archive);
        writeln!(out, "{output}: {}", object_outputs.join(" ")).unwrap();
        emit_mkdir(out, &archive.output, nmake);
        emit_recipe(out, &spec, nmake);
        writeln!(out).unwrap();
    } else if let Some(link) = &target.link {
        let driver = Language::Cxx;
        let cxx_opts = ctx.cxx_options(None, None);
        let spec = if target.kind == TargetKind::SharedLibrary {
            ctx.toolchain().link_shared_command(link, driver, Some(&cxx_opts))
        } else {
            ctx.toolchain().link_exe_command(link, driver, Some(&cxx_opts))
        };
        writeln!(out, "{output}: {}", object_outputs.join(" ")).unwrap();
        emit_mkdir(out, &link.output, nmake);
        emit_recipe(out, &spec, nmake);
        writeln!(out).unwrap();
    }
}

fn emit_mkdir(out: &mut String, output: &std::path::Path, nmake: bool) {
    let Some(parent) = output.parent() else { return };
    let parent = quote_path(parent);
    if nmake {
        writeln!(out, "\tif not exist {parent} mkdir {parent}").unwrap();
    } else {
        writeln!(out, "\t@mkdir -p {parent}").unwrap();
    }
}

fn emit_compile_rule(ctx: &BuildContext, out: &mut String, unit: &CompileUnit, nmake: bool) {
    let object = quote_path(&unit.input.output);
    let source = quote_path(&unit.discovered.absolute);

    let spec = if unit.is_resource {
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

    writeln!(out, "{object}: {source}").unwrap();
    emit_mkdir(out, &unit.input.output, nmake);
    emit_recipe(out, &spec, nmake);

    if let Some(dep) = &unit.input.dependency_output {
        if !nmake {
            writeln!(out, "-include {}", quote_path(dep)).unwrap();
        }
    }
    writeln!(out).unwrap();
}

fn emit_recipe(out: &mut String, spec: &CommandSpec, nmake: bool) {
    let tab = if nmake { "\t" } else { "\t" };
    writeln!(out, "{tab}{}", spec.display()).unwrap();
}

fn quote_path(path: &std::path::Path) -> String {
    let text = path.display().to_string();
    if text.contains(' ') {
        format!("\"{text}\"")
    } else {
        text
    }
}
