use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use fileshell_protocol::ConsoleMode;
use fileshell_protocol::FileCommand;

#[derive(Parser, Debug)]
#[command(name = "fileshell", version)]
pub struct Cli {
    /// Console mode to start in (overrides the configured default).
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Path to a config file (default: $FILESHELL_HOME/config.toml).
    #[arg(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Print events to stdout as JSONL instead of human output.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// What to do when a command fails for lack of permissions.
    #[arg(long, value_enum, default_value_t = EscalateArg::Ask)]
    pub escalate: EscalateArg,

    /// Submit asynchronously and stream results as they arrive.
    #[arg(long, default_value_t = false)]
    pub stream: bool,

    /// Override the shell backend inactivity timeout, in milliseconds.
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Restricted,
    Privileged,
}

impl From<ModeArg> for ConsoleMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Restricted => ConsoleMode::Restricted,
            ModeArg::Privileged => ConsoleMode::Privileged,
        }
    }
}

/// Escalation-prompt behavior for non-interactive use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EscalateArg {
    /// Ask on the terminal (y/N).
    Ask,
    /// Escalate without asking.
    Always,
    /// Never escalate; permission failures are final.
    Never,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List the entries of a directory.
    Ls { path: PathBuf },
    /// Report metadata for a path.
    Stat { path: PathBuf },
    /// Print the contents of a file.
    Cat { path: PathBuf },
    /// Replace the contents of a file.
    Write { path: PathBuf, contents: String },
    /// Create an empty file.
    Touch { path: PathBuf },
    /// Create a directory.
    Mkdir { path: PathBuf },
    /// Copy a file or directory tree.
    Cp { source: PathBuf, dest: PathBuf },
    /// Move or rename a file or directory.
    Mv { source: PathBuf, dest: PathBuf },
    /// Remove a path.
    Rm {
        /// Remove directories and their contents recursively.
        #[arg(short = 'r', long)]
        recursive: bool,
        path: PathBuf,
    },
    /// Change the permission bits of a path (octal, e.g. 644).
    Chmod { mode: String, path: PathBuf },
    /// Report the total size of a file or directory tree.
    Du { path: PathBuf },
    /// Run an arbitrary program through the console (shell backend only).
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

impl CliCommand {
    pub fn into_file_command(self) -> anyhow::Result<FileCommand> {
        Ok(match self {
            CliCommand::Ls { path } => FileCommand::ListDirectory { path },
            CliCommand::Stat { path } => FileCommand::Stat { path },
            CliCommand::Cat { path } => FileCommand::ReadFile { path },
            CliCommand::Write { path, contents } => FileCommand::WriteFile { path, contents },
            CliCommand::Touch { path } => FileCommand::CreateFile { path },
            CliCommand::Mkdir { path } => FileCommand::CreateDirectory { path },
            CliCommand::Cp { source, dest } => FileCommand::Copy { source, dest },
            CliCommand::Mv { source, dest } => FileCommand::Move { source, dest },
            CliCommand::Rm { recursive, path } => FileCommand::Delete { path, recursive },
            CliCommand::Chmod { mode, path } => {
                let mode = u32::from_str_radix(&mode, 8)
                    .map_err(|_| anyhow::anyhow!("invalid octal mode: {mode}"))?;
                FileCommand::ChangeMode { path, mode }
            }
            CliCommand::Du { path } => FileCommand::DiskUsage { path },
            CliCommand::Exec { command } => FileCommand::Exec { command },
        })
    }
}
