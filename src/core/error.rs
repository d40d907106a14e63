//! Central error taxonomy for the build core.
//!
//! Every fallible operation that a caller might want to branch on returns
//! (or wraps) a `BuildError` variant. Call sites that only need to
//! propagate failure upward use `anyhow::Result` and `?`, same as the
//! rest of the crate; `BuildError` is what they propagate.

use std::path::PathBuf;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// The complete set of error kinds a build can fail with.
///
/// Variants map 1:1 onto the documented exit-code taxonomy: anything here
/// maps to process exit code 1 except `Interrupted`, which the driver
/// maps to 130.
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error("project description failed schema validation at `{path}`")]
    #[diagnostic(code(core::schema_validation))]
    SchemaValidation {
        path: String,
        #[source_code]
        src: Option<NamedSource<String>>,
        #[label("here")]
        span: Option<SourceSpan>,
        message: String,
    },

    #[error("semantic validation failed: {message}")]
    #[diagnostic(code(core::semantic_validation))]
    SemanticValidation { message: String },

    #[error("malformed override key `{key}`")]
    #[diagnostic(code(core::override_grammar))]
    OverrideGrammar {
        key: String,
        #[source_code]
        src: Option<NamedSource<String>>,
        #[label("invalid dotted-key override")]
        span: Option<SourceSpan>,
    },

    #[error("could not resolve a toolchain: {message}")]
    #[diagnostic(code(core::toolchain_resolution), help("set CC/CXX or install a supported compiler"))]
    ToolchainResolution { message: String },

    #[error("architecture `{arch}` is not supported by this toolchain")]
    #[diagnostic(code(core::architecture_unsupported))]
    ArchitectureUnsupported { arch: String },

    #[error("compiler invocation failed for `{source}`")]
    #[diagnostic(code(core::compiler_invocation))]
    CompilerInvocation {
        source: PathBuf,
        command: String,
        stderr: String,
    },

    #[error("linker invocation failed for `{output}`")]
    #[diagnostic(code(core::linker_invocation))]
    LinkerInvocation {
        output: PathBuf,
        command: String,
        stderr: String,
    },

    #[error("archiver invocation failed for `{output}`")]
    #[diagnostic(code(core::archiver_invocation))]
    ArchiverInvocation {
        output: PathBuf,
        command: String,
        stderr: String,
    },

    #[error("resource compiler is required for `{source}` but was not found")]
    #[diagnostic(code(core::resource_compiler_missing))]
    ResourceCompilerMissing { source: PathBuf },

    #[error("failed to persist the incremental cache: {message}")]
    #[diagnostic(code(core::cache_persistence), severity(Warning))]
    CachePersistence { message: String },

    #[error("build interrupted")]
    #[diagnostic(code(core::interrupted))]
    Interrupted,
}

impl BuildError {
    /// The process exit code this error corresponds to.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Interrupted => 130,
            _ => 1,
        }
    }

    /// `true` for errors the driver should only warn about rather than
    /// treat as a fatal build failure.
    pub fn is_warning(&self) -> bool {
        matches!(self, BuildError::CachePersistence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_maps_to_130() {
        assert_eq!(BuildError::Interrupted.exit_code(), 130);
    }

    #[test]
    fn cache_persistence_is_a_warning() {
        let err = BuildError::CachePersistence {
            message: "disk full".into(),
        };
        assert!(err.is_warning());
        assert_eq!(err.exit_code(), 1);
    }
}
