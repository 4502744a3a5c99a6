use tokio_util::sync::CancellationToken;

use fileshell_protocol::FileCommand;

/// Default cap on buffered output per execution, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// How a submission is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// `execute` blocks until the terminal outcome has been delivered.
    #[default]
    Sync,
    /// `execute` returns right after scheduling; outcome arrives via the
    /// listener channel.
    Async,
}

/// One command invocation.
///
/// Cloning shares the cancellation token, so a clone resubmitted through the
/// relaunch protocol still observes a cancellation issued against the
/// original submission.
#[derive(Debug, Clone)]
pub struct Executable {
    command: FileCommand,
    mode: ExecMode,
    buffer_size: usize,
    cancel: CancellationToken,
}

impl Executable {
    pub fn new(command: FileCommand) -> Self {
        Self {
            command,
            mode: ExecMode::Sync,
            buffer_size: DEFAULT_BUFFER_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn command(&self) -> &FileCommand {
        &self.command
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn is_asynchronous(&self) -> bool {
        self.mode == ExecMode::Async
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation of this submission (and of any clone).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
