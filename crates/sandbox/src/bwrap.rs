use std::path::Path;

use crate::SandboxError;

/// Build the `bwrap` argv that runs `command` with `root` bind-mounted
/// read-write at `/workspace` and nothing else from the host filesystem
/// writable. Linux-only; returns [`SandboxError::NotSupported`] elsewhere.
#[cfg(target_os = "linux")]
pub fn build_sandbox_args(root: &Path, command: &[String]) -> Result<Vec<String>, SandboxError> {
    if command.is_empty() {
        return Err(SandboxError::ToolNotFound(String::new()));
    }

    let root_display = root.display().to_string();
    let mut args: Vec<String> = vec![
        "--ro-bind".into(), "/usr".into(), "/usr".into(),
        "--ro-bind".into(), "/bin".into(), "/bin".into(),
        "--ro-bind".into(), "/lib".into(), "/lib".into(),
        "--ro-bind-try".into(), "/lib64".into(), "/lib64".into(),
        "--ro-bind".into(), "/etc/resolv.conf".into(), "/etc/resolv.conf".into(),
        "--bind".into(), root_display, "/workspace".into(),
        "--chdir".into(), "/workspace".into(),
        "--unshare-all".into(),
        "--share-net".into(),
        "--die-with-parent".into(),
        "--new-session".into(),
    ];
    args.extend(command.iter().cloned());
    Ok(args)
}

#[cfg(not(target_os = "linux"))]
pub fn build_sandbox_args(_root: &Path, _command: &[String]) -> Result<Vec<String>, SandboxError> {
    Err(SandboxError::NotSupported)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn builds_argv_with_workspace_bind_and_command() {
        let root = Path::new("/tmp/ws");
        let args = build_sandbox_args(root, &["echo".into(), "hi".into()]).unwrap();
        assert!(args.windows(3).any(|w| w == ["--bind", "/tmp/ws", "/workspace"]));
        assert_eq!(&args[args.len() - 2..], &["echo".to_string(), "hi".to_string()]);
    }

    #[test]
    fn rejects_empty_command() {
        let root = Path::new("/tmp/ws");
        assert!(build_sandbox_args(root, &[]).is_err());
    }
}
