//! The file-emitting build backends (§4.5, strategies 1 and 2): a
//! Makefile/NMake emitter for GNU Make and NMake, and a Ninja emitter.
//! Both turn a synthesized [`BuildPlan`](crate::builder::plan::BuildPlan)
//! into a build file on disk, then shell out to the corresponding build
//! tool to actually run it — unlike [`NativeScheduler`](crate::builder::native::NativeScheduler),
//! which never touches disk for its own scheduling state.

pub mod makefile;
pub mod ninja;

use std::path::PathBuf;

use crate::builder::context::BuildContext;
use crate::builder::native::BuiltArtifact;
use crate::builder::plan::BuildPlan;
use crate::core::error::BuildError;
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

/// Generate the backend's build file for `plan` under `ctx`'s build
/// output directory, then invoke the corresponding external tool.
pub fn build(
    ctx: &BuildContext,
    plan: &BuildPlan,
    strategy: crate::core::abi::BuildStrategy,
) -> Result<Vec<BuiltArtifact>, BuildError> {
    let build_out = ctx.build_out();
    ensure_dir(&build_out).map_err(|e| BuildError::SemanticValidation {
        message: format!("failed to create build output directory: {e}"),
    })?;

    match strategy {
        crate::core::abi::BuildStrategy::Makefile => {
            let is_nmake = matches!(
                ctx.toolchain().platform(),
                crate::builder::toolchain::ToolchainPlatform::Msvc
            );
            let text = makefile::emit(ctx, plan, is_nmake);
            let file_name = if is_nmake { "Makefile.nmake" } else { "Makefile" };
            let path = build_out.join(file_name);
            std::fs::write(&path, text).map_err(|e| BuildError::SemanticValidation {
                message: format!("failed to write `{}`: {e}", path.display()),
            })?;
            run_tool(if is_nmake { "nmake" } else { "make" }, &["-f"], &path, &build_out)?;
        }
        crate::core::abi::BuildStrategy::Ninja => {
            let text = ninja::emit(ctx, plan);
            let path = build_out.join("build.ninja");
            std::fs::write(&path, text).map_err(|e| BuildError::SemanticValidation {
                message: format!("failed to write `{}`: {e}", path.display()),
            })?;
            run_tool("ninja", &["-f"], &path, &build_out)?;
        }
        crate::core::abi::BuildStrategy::Native => {
            return Err(BuildError::SemanticValidation {
                message: "backend::build called with the native strategy; use NativeScheduler directly".to_string(),
            });
        }
    }

    Ok(plan
        .targets
        .iter()
        .map(|t| BuiltArtifact {
            target: t.name,
            path: t.output.clone(),
        })
        .collect())
}

fn run_tool(program: &str, file_flag: &[&str], file: &PathBuf, cwd: &PathBuf) -> Result<(), BuildError> {
    let mut cmd = ProcessBuilder::new(program).cwd(cwd);
    for flag in file_flag {
        cmd = cmd.arg(flag);
    }
    cmd = cmd.arg(file);

    let mut stderr_tail = String::new();
    let status = cmd
        .exec_streaming(|line| {
            tracing::info!("{line}");
            stderr_tail.push_str(line);
            stderr_tail.push('\n');
        })
        .map_err(|e| BuildError::SemanticValidation {
            message: format!("failed to run `{program}`: {e}"),
        })?;
    if !status.success() {
        return Err(BuildError::LinkerInvocation {
            output: file.clone(),
            command: cmd.display_command(),
            stderr: stderr_tail,
        });
    }
    Ok(())
}
