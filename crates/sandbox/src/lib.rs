//! Sandbox policy engine.
//!
//! Generalizes the workspace-root containment check used by the built-in
//! file tools into a stronger, seven-step contract: Unicode space
//! normalization, home-shorthand expansion, symlink walk-rejection, a
//! sensitive-filename denylist, and write-protected-directory rejection,
//! on top of the original `..`-rejection and containment check.
//!
//! Also builds the argv for running a tool under `bwrap` (bubblewrap) on
//! Linux. Other platforms don't get a sandbox build; callers fall back to
//! running the tool unsandboxed and log that fact once.

mod bwrap;
pub mod validate;

pub use bwrap::build_sandbox_args;
pub use validate::{validate_sandboxed_path, AccessMode};

use std::sync::Once;

/// Every failure mode the sandbox policy engine can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("path '{0}' escapes the sandbox root")]
    Escape(String),
    #[error("path '{0}' traverses a symlink, which is not allowed inside the sandbox")]
    SymlinkNotAllowed(String),
    #[error("path '{0}' matches a denied filename pattern")]
    DeniedFile(String),
    #[error("path '{0}' is under a write-protected directory")]
    ProtectedWrite(String),
    #[error("sandboxing is not supported on this platform")]
    NotSupported,
    #[error("tool '{0}' is not registered")]
    ToolNotFound(String),
}

impl From<SandboxError> for gw_domain::error::Error {
    fn from(e: SandboxError) -> Self {
        gw_domain::error::Error::SandboxDenied(e.to_string())
    }
}

/// Filenames that are never readable or writable, regardless of location
/// within the sandbox root.
pub const DENIED_FILENAMES: &[&str] = &[
    ".ssh", "id_rsa", "id_ed25519", ".aws", ".gnupg", ".netrc", ".git-credentials",
];

/// Directories that may be read but never written to, even when they sit
/// inside the sandbox root (e.g. a vendored dependency tree).
pub const PROTECTED_WRITE_DIRS: &[&str] = &["node_modules/.bin", ".git"];

static WARN_ONCE: Once = Once::new();

/// Log, exactly once per process, that sandboxing fell back to unsandboxed
/// execution. Call this from `gw-tools` whenever [`build_sandbox_args`]
/// returns [`SandboxError::NotSupported`].
pub fn warn_unsandboxed_once() {
    WARN_ONCE.call_once(|| {
        tracing::warn!(
            "bwrap is not available on this platform; tool execution is running unsandboxed"
        );
    });
}
