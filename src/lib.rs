//! A JSON-driven, cross-platform C/C++ build orchestrator.
//!
//! This crate provides the core library: project description loading and
//! validation, toolchain resolution, source discovery, command
//! synthesis, the incremental cache, and the build backends (Makefile/
//! NMake, Ninja, and an in-process native scheduler).

pub mod builder;
pub mod core;
pub mod util;

pub use core::{error::BuildError, target::Target, workspace::Workspace};
