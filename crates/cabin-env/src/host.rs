//! Actions performed on the host machine.

use crate::context::EnvContext;
use crate::error::{EnvError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Maximum diagnostic output kept on a failed command (64 KiB).
const MAX_DIAGNOSTIC_SIZE: usize = 64 * 1024;

/// Command execution shared by host and guest action sets.
pub trait RunActions {
    /// Run a command to completion, failing on a non-zero exit status.
    fn run(&self, args: &[&str]) -> Result<()>;

    /// Run a command and return its stdout without the trailing newline.
    fn run_output(&self, args: &[&str]) -> Result<String>;

    /// Run a command attached to the caller's stdin, stdout and stderr.
    fn run_interactive(&self, args: &[&str]) -> Result<()>;
}

/// Whole-file I/O.
pub trait FileActions {
    /// Read a file to a string.
    fn read(&self, path: &Path) -> Result<String>;

    /// Replace a file's contents. Never leaves a partial file behind.
    fn write(&self, path: &Path, body: &str) -> Result<()>;
}

/// Actions performed on the host.
pub trait HostActions: RunActions + FileActions {
    /// Derive a new instance whose environment is this one's overridden by `overrides`.
    fn with_env(&self, overrides: EnvContext) -> Self
    where
        Self: Sized;

    /// Environment variable as seen by commands run from this instance.
    ///
    /// Returns an empty string when unbound.
    fn env(&self, name: &str) -> String;
}

/// Host action set backed by local processes and the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct Host {
    env: EnvContext,
}

impl Host {
    /// Create a host with no environment overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host that applies `env` to every command it runs.
    pub fn with_context(env: EnvContext) -> Self {
        Self { env }
    }

    /// The environment overrides of this host.
    pub fn context(&self) -> &EnvContext {
        &self.env
    }

    fn command(&self, args: &[&str]) -> Result<Command> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| EnvError::Config("empty command line".into()))?;
        let mut cmd = Command::new(program);
        cmd.args(rest).envs(self.env.iter());
        Ok(cmd)
    }

    fn capture(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.command(args)?;
        let start = Instant::now();
        debug!(command = ?args, "running command");

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(args, e))?;

        if !output.status.success() {
            let status = output.status.code().unwrap_or(-1);
            let stderr = diagnostic(&output.stderr, &output.stdout);
            debug!(command = ?args, status, stderr = %stderr, "command failed");
            return Err(EnvError::Execution {
                command: args.join(" "),
                status,
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            command = ?args,
            stdout_len = stdout.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "command completed"
        );
        trace!(stdout = %stdout, "command output");
        Ok(stdout)
    }
}

impl RunActions for Host {
    fn run(&self, args: &[&str]) -> Result<()> {
        self.capture(args).map(|_| ())
    }

    fn run_output(&self, args: &[&str]) -> Result<String> {
        let stdout = self.capture(args)?;
        Ok(stdout.trim_end_matches(|c| c == '\n' || c == '\r').to_string())
    }

    fn run_interactive(&self, args: &[&str]) -> Result<()> {
        let mut cmd = self.command(args)?;
        debug!(command = ?args, "running interactive command");

        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(args, e))?;

        if !status.success() {
            return Err(EnvError::Execution {
                command: args.join(" "),
                status: status.code().unwrap_or(-1),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

impl FileActions for Host {
    fn read(&self, path: &Path) -> Result<String> {
        trace!(path = %path.display(), "reading file");
        fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EnvError::NotFound(path.to_path_buf()),
            _ => EnvError::io(format!("read {}", path.display()), e),
        })
    }

    fn write(&self, path: &Path, body: &str) -> Result<()> {
        debug!(path = %path.display(), len = body.len(), "writing file");
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| EnvError::io(format!("create directory {}", dir.display()), e))?;

        let context = || format!("write {}", path.display());

        // Staged next to the target so the final rename stays on one filesystem.
        let mut staged = NamedTempFile::new_in(&dir).map_err(|e| EnvError::io(context(), e))?;
        if let Ok(meta) = fs::metadata(path) {
            // keep the mode of the file being replaced
            let _ = staged.as_file().set_permissions(meta.permissions());
        }
        staged
            .write_all(body.as_bytes())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| EnvError::io(context(), e))?;
        staged
            .persist(path)
            .map_err(|e| EnvError::io(context(), e.error))?;
        Ok(())
    }
}

impl HostActions for Host {
    fn with_env(&self, overrides: EnvContext) -> Self {
        Self {
            env: self.env.merged(&overrides),
        }
    }

    fn env(&self, name: &str) -> String {
        match self.env.get(name) {
            Some(value) => value.to_string(),
            None => std::env::var_os(name)
                .map(|v| v.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

fn spawn_error(args: &[&str], err: std::io::Error) -> EnvError {
    debug!(command = ?args, error = %err, "failed to spawn command");
    EnvError::Execution {
        command: args.join(" "),
        status: -1,
        stderr: format!("failed to execute {}: {}", args[0], err),
    }
}

/// Prefer stderr, fall back to stdout, trimmed and capped.
fn diagnostic(stderr: &[u8], stdout: &[u8]) -> String {
    let raw = if stderr.iter().all(u8::is_ascii_whitespace) {
        stdout
    } else {
        stderr
    };
    let text = String::from_utf8_lossy(raw);
    truncate_output(text.trim(), MAX_DIAGNOSTIC_SIZE)
}

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str("\n... [output truncated]");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let host = Host::new();

        host.write(&path, "data").unwrap();
        assert_eq!(host.read(&path).unwrap(), "data");
    }

    #[test]
    fn test_write_replaces_and_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dirs/f.txt");
        let host = Host::new();

        host.write(&path, "first").unwrap();
        host.write(&path, "second").unwrap();
        assert_eq!(host.read(&path).unwrap(), "second");

        // no staging files left around
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let err = Host::new().read(&dir.path().join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_run_output_trims_newline() {
        let out = Host::new().run_output(&["sh", "-c", "echo hello"]).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_run_output_excludes_stderr() {
        let out = Host::new()
            .run_output(&["sh", "-c", "echo out; echo err >&2"])
            .unwrap();
        assert_eq!(out, "out");
    }

    #[test]
    fn test_run_failure_carries_status_and_stderr() {
        let err = Host::new()
            .run(&["sh", "-c", "echo oops >&2; exit 3"])
            .unwrap_err();
        match err {
            EnvError::Execution { status, stderr, .. } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_missing_program() {
        let err = Host::new()
            .run(&["cabin-definitely-not-a-program"])
            .unwrap_err();
        assert_eq!(err.exit_status(), Some(-1));
    }

    #[test]
    fn test_run_empty_args() {
        assert!(matches!(Host::new().run(&[]), Err(EnvError::Config(_))));
    }

    #[test]
    fn test_env_applied_to_commands() {
        let host = Host::new().with_env(EnvContext::from_pairs([("CABIN_TEST_FOO", "bar")]));
        let out = host
            .run_output(&["sh", "-c", "printf %s \"$CABIN_TEST_FOO\""])
            .unwrap();
        assert_eq!(out, "bar");
    }

    #[test]
    fn test_env_lookup() {
        let host = Host::new();
        assert_eq!(host.env("CABIN_TEST_SURELY_UNSET_VAR"), "");
        assert_eq!(
            host.env("PATH"),
            std::env::var("PATH").unwrap_or_default()
        );

        let scoped = host.with_env(EnvContext::from_pairs([("PATH", "/override")]));
        assert_eq!(scoped.env("PATH"), "/override");
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short", 10), "short");
        let long = "é".repeat(10);
        let truncated = truncate_output(&long, 5);
        assert!(truncated.starts_with("éé"));
        assert!(truncated.ends_with("[output truncated]"));
    }
}
