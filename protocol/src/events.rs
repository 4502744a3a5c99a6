use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Which pipe of the underlying execution a partial result came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Events observed by a listener over the lifetime of one submission.
///
/// For any submission the sequence is: one `started`, zero or more
/// `partial_result`, then exactly one of `exited` / `canceled` / `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecEvent {
    Started(ExecStartedEvent),
    PartialResult(PartialResultEvent),
    Exited(ExecExitedEvent),
    Canceled(ExecCanceledEvent),
    Failed(ExecFailedEvent),
}

impl ExecEvent {
    /// True for the events that end a submission.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecEvent::Exited(_) | ExecEvent::Canceled(_) | ExecEvent::Failed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecStartedEvent {
    /// Human-readable description of the command being run.
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResultEvent {
    pub stream: OutputStream,
    pub chunk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecExitedEvent {
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecCanceledEvent {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecFailedEvent {
    pub error: ExecErrorInfo,
}

/// Serializable mirror of the console error taxonomy, carrying enough
/// structure for a front end to translate failures without string parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecErrorInfo {
    pub kind: ExecErrorKind,
    pub message: String,
    /// Whether escalating to a privileged console may resolve the failure.
    pub relaunchable: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExecErrorKind {
    ConsoleAlloc,
    InsufficientPermissions,
    NoSuchFileOrDirectory,
    OperationTimeout,
    Execution,
    CommandNotFound,
    ReadOnlyFilesystem,
}
