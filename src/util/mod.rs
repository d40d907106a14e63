//! Shared utilities

pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod interning;
pub mod json_comments;
pub mod process;

pub use diagnostic::Diagnostic;
pub use interning::InternedString;
