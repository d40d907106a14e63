//! Build orchestration.
//!
//! This module implements the pieces that turn a resolved workspace into
//! built artifacts: source discovery, the command synthesizer that turns
//! a target into compiler/linker invocations, the incremental cache, the
//! three build-backend strategies (Makefile, Ninja, and an in-process
//! native scheduler), and the driver that ties them together.

pub mod backend;
pub mod cache;
pub mod context;
pub mod discovery;
pub mod executor;
pub mod native;
pub mod plan;
pub mod toolchain;
pub mod warnings;

pub use cache::Cache;
pub use context::BuildContext;
pub use executor::BuildExecutor;
pub use native::{BuiltArtifact, Cancellation, NativeScheduler};
pub use plan::BuildPlan;
pub use toolchain::{
    resolve_toolchain, CommandSpec, GccToolchain, MsvcToolchain, ResolvedToolchain, Toolchain,
    ToolchainPlatform,
};
