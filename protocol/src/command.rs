use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// One file-manager operation, submitted to whichever console is current.
///
/// The shell backend renders each variant to a command line; the restricted
/// backend implements the same set directly in-process, except for `Exec`,
/// which only a shell can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum FileCommand {
    /// List the entries of a directory, one per partial-result line.
    ListDirectory { path: PathBuf },
    /// Report metadata for a single path.
    Stat { path: PathBuf },
    /// Stream the contents of a file.
    ReadFile { path: PathBuf },
    /// Replace the contents of a file.
    WriteFile { path: PathBuf, contents: String },
    /// Create an empty file (no-op if it already exists).
    CreateFile { path: PathBuf },
    /// Create a directory. Fails if it already exists.
    CreateDirectory { path: PathBuf },
    /// Copy a file or directory tree.
    Copy { source: PathBuf, dest: PathBuf },
    /// Rename/move a file or directory.
    Move { source: PathBuf, dest: PathBuf },
    /// Remove a path. Directories require `recursive`.
    Delete { path: PathBuf, recursive: bool },
    /// Change the permission bits of a path.
    ChangeMode { path: PathBuf, mode: u32 },
    /// Report the total size of a file or directory tree.
    DiskUsage { path: PathBuf },
    /// Run an arbitrary program with arguments. Shell backend only.
    Exec { command: Vec<String> },
}

impl FileCommand {
    /// The primary path this command operates on, when there is one.
    pub fn target(&self) -> Option<&Path> {
        match self {
            FileCommand::ListDirectory { path }
            | FileCommand::Stat { path }
            | FileCommand::ReadFile { path }
            | FileCommand::WriteFile { path, .. }
            | FileCommand::CreateFile { path }
            | FileCommand::CreateDirectory { path }
            | FileCommand::Delete { path, .. }
            | FileCommand::ChangeMode { path, .. }
            | FileCommand::DiskUsage { path } => Some(path),
            FileCommand::Copy { dest, .. } | FileCommand::Move { dest, .. } => Some(dest),
            FileCommand::Exec { .. } => None,
        }
    }

    /// Short human-readable description, used in events and error messages.
    pub fn describe(&self) -> String {
        match self {
            FileCommand::ListDirectory { path } => format!("ls {}", path.display()),
            FileCommand::Stat { path } => format!("stat {}", path.display()),
            FileCommand::ReadFile { path } => format!("cat {}", path.display()),
            FileCommand::WriteFile { path, .. } => format!("write {}", path.display()),
            FileCommand::CreateFile { path } => format!("touch {}", path.display()),
            FileCommand::CreateDirectory { path } => format!("mkdir {}", path.display()),
            FileCommand::Copy { source, dest } => {
                format!("cp {} {}", source.display(), dest.display())
            }
            FileCommand::Move { source, dest } => {
                format!("mv {} {}", source.display(), dest.display())
            }
            FileCommand::Delete { path, recursive } => {
                if *recursive {
                    format!("rm -r {}", path.display())
                } else {
                    format!("rm {}", path.display())
                }
            }
            FileCommand::ChangeMode { path, mode } => {
                format!("chmod {mode:o} {}", path.display())
            }
            FileCommand::DiskUsage { path } => format!("du {}", path.display()),
            FileCommand::Exec { command } => command.join(" "),
        }
    }
}
