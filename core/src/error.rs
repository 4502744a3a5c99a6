use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use fileshell_protocol::ExecErrorInfo;
use fileshell_protocol::ExecErrorKind;

/// Closed taxonomy of console failures.
///
/// Backend-specific faults (I/O errors, shell exit codes, stderr text) are
/// normalized into these kinds before they reach a caller; the relaunch
/// protocol keys off [`ConsoleError::is_relaunchable`] rather than on the
/// concrete backend that produced the error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsoleError {
    /// The execution backend could not be created, or is no longer usable.
    /// Never retried automatically.
    #[error("console allocation failed: {message}")]
    Alloc { message: String },

    /// The console's identity lacks rights for the target. The only kind
    /// the relaunch protocol will offer to retry under a privileged console.
    #[error("insufficient permissions: {target}")]
    InsufficientPermissions { target: String },

    #[error("no such file or directory: {path}")]
    NoSuchFileOrDirectory { path: String },

    /// The backend produced no output within the configured window. The
    /// console is likely wedged; `realloc()` it before retrying.
    #[error("no response from console after {timeout:?}")]
    OperationTimeout { timeout: Duration },

    /// Generic non-zero exit.
    #[error("command failed with exit code {exit_code}: {detail}")]
    Execution { exit_code: i32, detail: String },

    /// The command kind is not supported by the current backend.
    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("read-only filesystem: {path}")]
    ReadOnlyFilesystem { path: String },
}

impl ConsoleError {
    pub fn alloc(message: impl Into<String>) -> Self {
        ConsoleError::Alloc {
            message: message.into(),
        }
    }

    /// Whether escalating to a privileged console may resolve this failure.
    pub fn is_relaunchable(&self) -> bool {
        matches!(self, ConsoleError::InsufficientPermissions { .. })
    }

    pub fn kind(&self) -> ExecErrorKind {
        match self {
            ConsoleError::Alloc { .. } => ExecErrorKind::ConsoleAlloc,
            ConsoleError::InsufficientPermissions { .. } => {
                ExecErrorKind::InsufficientPermissions
            }
            ConsoleError::NoSuchFileOrDirectory { .. } => ExecErrorKind::NoSuchFileOrDirectory,
            ConsoleError::OperationTimeout { .. } => ExecErrorKind::OperationTimeout,
            ConsoleError::Execution { .. } => ExecErrorKind::Execution,
            ConsoleError::CommandNotFound { .. } => ExecErrorKind::CommandNotFound,
            ConsoleError::ReadOnlyFilesystem { .. } => ExecErrorKind::ReadOnlyFilesystem,
        }
    }

    /// Serializable form for the event stream.
    pub fn to_info(&self) -> ExecErrorInfo {
        ExecErrorInfo {
            kind: self.kind(),
            message: self.to_string(),
            relaunchable: self.is_relaunchable(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Map an I/O error observed while operating on `path` into the taxonomy.
pub(crate) fn classify_io_error(err: &io::Error, path: &Path) -> ConsoleError {
    if err.raw_os_error() == Some(libc::EROFS) {
        return ConsoleError::ReadOnlyFilesystem {
            path: path.display().to_string(),
        };
    }
    match err.kind() {
        io::ErrorKind::NotFound => ConsoleError::NoSuchFileOrDirectory {
            path: path.display().to_string(),
        },
        io::ErrorKind::PermissionDenied => ConsoleError::InsufficientPermissions {
            target: path.display().to_string(),
        },
        _ => ConsoleError::Execution {
            exit_code: -1,
            detail: err.to_string(),
        },
    }
}

/// Normalize a shell command failure (exit code plus captured stderr) into
/// the taxonomy. `target` names the path or command for error context.
pub(crate) fn classify_shell_failure(
    exit_code: i32,
    stderr: &str,
    target: &str,
) -> ConsoleError {
    let haystack = stderr.to_ascii_lowercase();
    if haystack.contains("permission denied") || haystack.contains("operation not permitted") {
        return ConsoleError::InsufficientPermissions {
            target: target.to_string(),
        };
    }
    if haystack.contains("no such file or directory") {
        return ConsoleError::NoSuchFileOrDirectory {
            path: target.to_string(),
        };
    }
    if haystack.contains("read-only file system") {
        return ConsoleError::ReadOnlyFilesystem {
            path: target.to_string(),
        };
    }
    // 127 is the POSIX shell's "command not found" exit code; some shells
    // only say "not found" on stderr.
    if exit_code == 127 || haystack.contains("command not found") || haystack.contains("not found")
    {
        return ConsoleError::CommandNotFound {
            command: target.to_string(),
        };
    }
    ConsoleError::Execution {
        exit_code,
        detail: first_line(stderr).to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|line| !line.trim().is_empty()).unwrap_or("")
}
